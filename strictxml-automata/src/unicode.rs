//! Unicode general categories and block names for `\p{..}`/`\P{..}` escapes.
//!
//! The tables cover Latin-1 exactly and the most common scripts and symbol blocks
//! beyond it. Code points outside the listed ranges fall into no category except `Cn`.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use crate::util::{complement_ranges, normalize_ranges};

type Table = &'static [(char, char)];

const LU: Table = &[
    ('A', 'Z'),
    ('\u{C0}', '\u{D6}'),
    ('\u{D8}', '\u{DE}'),
    ('\u{386}', '\u{386}'),
    ('\u{388}', '\u{38A}'),
    ('\u{391}', '\u{3A1}'),
    ('\u{3A3}', '\u{3AB}'),
    ('\u{400}', '\u{42F}'),
    ('\u{531}', '\u{556}'),
    ('\u{10A0}', '\u{10C5}'),
    ('\u{2102}', '\u{2102}'),
    ('\u{210B}', '\u{210D}'),
    ('\u{FF21}', '\u{FF3A}'),
];
const LL: Table = &[
    ('a', 'z'),
    ('\u{B5}', '\u{B5}'),
    ('\u{DF}', '\u{F6}'),
    ('\u{F8}', '\u{FF}'),
    ('\u{250}', '\u{2AF}'),
    ('\u{3AC}', '\u{3CE}'),
    ('\u{430}', '\u{45F}'),
    ('\u{561}', '\u{587}'),
    ('\u{1D00}', '\u{1D2B}'),
    ('\u{210A}', '\u{210A}'),
    ('\u{FF41}', '\u{FF5A}'),
];
const LT: Table = &[
    ('\u{1C5}', '\u{1C5}'),
    ('\u{1C8}', '\u{1C8}'),
    ('\u{1CB}', '\u{1CB}'),
    ('\u{1F2}', '\u{1F2}'),
    ('\u{1F88}', '\u{1F8F}'),
    ('\u{1F98}', '\u{1F9F}'),
    ('\u{1FA8}', '\u{1FAF}'),
];
const LM: Table = &[
    ('\u{2B0}', '\u{2C1}'),
    ('\u{2C6}', '\u{2D1}'),
    ('\u{2E0}', '\u{2E4}'),
    ('\u{640}', '\u{640}'),
    ('\u{3005}', '\u{3005}'),
    ('\u{309D}', '\u{309E}'),
    ('\u{30FC}', '\u{30FE}'),
];
const LO: Table = &[
    ('\u{AA}', '\u{AA}'),
    ('\u{BA}', '\u{BA}'),
    ('\u{5D0}', '\u{5EA}'),
    ('\u{620}', '\u{63F}'),
    ('\u{641}', '\u{64A}'),
    ('\u{905}', '\u{939}'),
    ('\u{E01}', '\u{E30}'),
    ('\u{1100}', '\u{11FF}'),
    ('\u{3041}', '\u{3096}'),
    ('\u{30A1}', '\u{30FA}'),
    ('\u{3400}', '\u{4DBF}'),
    ('\u{4E00}', '\u{9FFF}'),
    ('\u{AC00}', '\u{D7A3}'),
    ('\u{F900}', '\u{FA6D}'),
    ('\u{20000}', '\u{2A6DF}'),
];
const MN: Table = &[
    ('\u{300}', '\u{36F}'),
    ('\u{483}', '\u{487}'),
    ('\u{591}', '\u{5BD}'),
    ('\u{64B}', '\u{65F}'),
    ('\u{941}', '\u{948}'),
    ('\u{E31}', '\u{E31}'),
    ('\u{E34}', '\u{E3A}'),
    ('\u{20D0}', '\u{20DC}'),
    ('\u{3099}', '\u{309A}'),
    ('\u{FE20}', '\u{FE2F}'),
];
const MC: Table = &[
    ('\u{903}', '\u{903}'),
    ('\u{93E}', '\u{940}'),
    ('\u{949}', '\u{94C}'),
];
const ME: Table = &[('\u{488}', '\u{489}'), ('\u{20DD}', '\u{20E0}')];
const ND: Table = &[
    ('0', '9'),
    ('\u{660}', '\u{669}'),
    ('\u{6F0}', '\u{6F9}'),
    ('\u{966}', '\u{96F}'),
    ('\u{E50}', '\u{E59}'),
    ('\u{FF10}', '\u{FF19}'),
];
const NL: Table = &[
    ('\u{16EE}', '\u{16F0}'),
    ('\u{2160}', '\u{2182}'),
    ('\u{3007}', '\u{3007}'),
    ('\u{3021}', '\u{3029}'),
];
const NO: Table = &[
    ('\u{B2}', '\u{B3}'),
    ('\u{B9}', '\u{B9}'),
    ('\u{BC}', '\u{BE}'),
    ('\u{2070}', '\u{2070}'),
    ('\u{2074}', '\u{2079}'),
    ('\u{2080}', '\u{2089}'),
    ('\u{2460}', '\u{249B}'),
];
const PC: Table = &[
    ('_', '_'),
    ('\u{203F}', '\u{2040}'),
    ('\u{FE33}', '\u{FE34}'),
    ('\u{FF3F}', '\u{FF3F}'),
];
const PD: Table = &[
    ('-', '-'),
    ('\u{58A}', '\u{58A}'),
    ('\u{2010}', '\u{2015}'),
    ('\u{301C}', '\u{301C}'),
    ('\u{FF0D}', '\u{FF0D}'),
];
const PS: Table = &[
    ('(', '('),
    ('[', '['),
    ('{', '{'),
    ('\u{F3A}', '\u{F3A}'),
    ('\u{F3C}', '\u{F3C}'),
    ('\u{201A}', '\u{201A}'),
    ('\u{201E}', '\u{201E}'),
    ('\u{2045}', '\u{2045}'),
    ('\u{207D}', '\u{207D}'),
    ('\u{208D}', '\u{208D}'),
    ('\u{3008}', '\u{3008}'),
    ('\u{300A}', '\u{300A}'),
    ('\u{300C}', '\u{300C}'),
    ('\u{300E}', '\u{300E}'),
    ('\u{3010}', '\u{3010}'),
    ('\u{FF08}', '\u{FF08}'),
    ('\u{FF3B}', '\u{FF3B}'),
    ('\u{FF5B}', '\u{FF5B}'),
];
const PE: Table = &[
    (')', ')'),
    (']', ']'),
    ('}', '}'),
    ('\u{F3B}', '\u{F3B}'),
    ('\u{F3D}', '\u{F3D}'),
    ('\u{2046}', '\u{2046}'),
    ('\u{207E}', '\u{207E}'),
    ('\u{208E}', '\u{208E}'),
    ('\u{3009}', '\u{3009}'),
    ('\u{300B}', '\u{300B}'),
    ('\u{300D}', '\u{300D}'),
    ('\u{300F}', '\u{300F}'),
    ('\u{3011}', '\u{3011}'),
    ('\u{FF09}', '\u{FF09}'),
    ('\u{FF3D}', '\u{FF3D}'),
    ('\u{FF5D}', '\u{FF5D}'),
];
const PI: Table = &[
    ('\u{AB}', '\u{AB}'),
    ('\u{2018}', '\u{2018}'),
    ('\u{201B}', '\u{201C}'),
    ('\u{201F}', '\u{201F}'),
    ('\u{2039}', '\u{2039}'),
];
const PF: Table = &[
    ('\u{BB}', '\u{BB}'),
    ('\u{2019}', '\u{2019}'),
    ('\u{201D}', '\u{201D}'),
    ('\u{203A}', '\u{203A}'),
];
const PO: Table = &[
    ('!', '#'),
    ('%', '\''),
    ('*', '*'),
    (',', ','),
    ('.', '/'),
    (':', ';'),
    ('?', '@'),
    ('\\', '\\'),
    ('\u{A1}', '\u{A1}'),
    ('\u{A7}', '\u{A7}'),
    ('\u{B6}', '\u{B7}'),
    ('\u{BF}', '\u{BF}'),
    ('\u{37E}', '\u{37E}'),
    ('\u{387}', '\u{387}'),
    ('\u{589}', '\u{589}'),
    ('\u{60C}', '\u{60D}'),
    ('\u{964}', '\u{965}'),
    ('\u{2016}', '\u{2017}'),
    ('\u{2020}', '\u{2027}'),
    ('\u{2030}', '\u{2038}'),
    ('\u{203B}', '\u{203E}'),
    ('\u{3001}', '\u{3003}'),
    ('\u{FF01}', '\u{FF03}'),
    ('\u{FF05}', '\u{FF07}'),
    ('\u{FF0C}', '\u{FF0C}'),
    ('\u{FF0E}', '\u{FF0F}'),
];
const SM: Table = &[
    ('+', '+'),
    ('<', '>'),
    ('|', '|'),
    ('~', '~'),
    ('\u{AC}', '\u{AC}'),
    ('\u{B1}', '\u{B1}'),
    ('\u{D7}', '\u{D7}'),
    ('\u{F7}', '\u{F7}'),
    ('\u{2044}', '\u{2044}'),
    ('\u{2190}', '\u{2194}'),
    ('\u{2200}', '\u{22FF}'),
    ('\u{FF0B}', '\u{FF0B}'),
    ('\u{FF1C}', '\u{FF1E}'),
];
const SC: Table = &[
    ('$', '$'),
    ('\u{A2}', '\u{A5}'),
    ('\u{58F}', '\u{58F}'),
    ('\u{E3F}', '\u{E3F}'),
    ('\u{20A0}', '\u{20C0}'),
    ('\u{FF04}', '\u{FF04}'),
    ('\u{FFE0}', '\u{FFE1}'),
];
const SK: Table = &[
    ('^', '^'),
    ('`', '`'),
    ('\u{A8}', '\u{A8}'),
    ('\u{AF}', '\u{AF}'),
    ('\u{B4}', '\u{B4}'),
    ('\u{B8}', '\u{B8}'),
    ('\u{2C2}', '\u{2C5}'),
    ('\u{2D2}', '\u{2DF}'),
    ('\u{FF3E}', '\u{FF3E}'),
    ('\u{FF40}', '\u{FF40}'),
];
const SO: Table = &[
    ('\u{A6}', '\u{A6}'),
    ('\u{A9}', '\u{A9}'),
    ('\u{AE}', '\u{AE}'),
    ('\u{B0}', '\u{B0}'),
    ('\u{2100}', '\u{2101}'),
    ('\u{2103}', '\u{2106}'),
    ('\u{2195}', '\u{21FF}'),
    ('\u{2300}', '\u{23FF}'),
    ('\u{2500}', '\u{26FF}'),
    ('\u{2700}', '\u{27BF}'),
    ('\u{1F300}', '\u{1F5FF}'),
];
const ZS: Table = &[
    (' ', ' '),
    ('\u{A0}', '\u{A0}'),
    ('\u{1680}', '\u{1680}'),
    ('\u{2000}', '\u{200A}'),
    ('\u{202F}', '\u{202F}'),
    ('\u{205F}', '\u{205F}'),
    ('\u{3000}', '\u{3000}'),
];
const ZL: Table = &[('\u{2028}', '\u{2028}')];
const ZP: Table = &[('\u{2029}', '\u{2029}')];
const CC: Table = &[('\u{0}', '\u{1F}'), ('\u{7F}', '\u{9F}')];
const CF: Table = &[
    ('\u{AD}', '\u{AD}'),
    ('\u{600}', '\u{605}'),
    ('\u{200B}', '\u{200F}'),
    ('\u{202A}', '\u{202E}'),
    ('\u{2060}', '\u{2064}'),
    ('\u{FEFF}', '\u{FEFF}'),
];
const CO: Table = &[
    ('\u{E000}', '\u{F8FF}'),
    ('\u{F0000}', '\u{FFFFD}'),
    ('\u{100000}', '\u{10FFFD}'),
];

const CATEGORIES: &[(&str, Table)] = &[
    ("Lu", LU),
    ("Ll", LL),
    ("Lt", LT),
    ("Lm", LM),
    ("Lo", LO),
    ("Mn", MN),
    ("Mc", MC),
    ("Me", ME),
    ("Nd", ND),
    ("Nl", NL),
    ("No", NO),
    ("Pc", PC),
    ("Pd", PD),
    ("Ps", PS),
    ("Pe", PE),
    ("Pi", PI),
    ("Pf", PF),
    ("Po", PO),
    ("Zs", ZS),
    ("Zl", ZL),
    ("Zp", ZP),
    ("Sm", SM),
    ("Sc", SC),
    ("Sk", SK),
    ("So", SO),
    ("Cc", CC),
    ("Cf", CF),
    ("Co", CO),
];

const BLOCKS: &[(&str, char, char)] = &[
    ("BasicLatin", '\u{0}', '\u{7F}'),
    ("Latin-1Supplement", '\u{80}', '\u{FF}'),
    ("LatinExtended-A", '\u{100}', '\u{17F}'),
    ("LatinExtended-B", '\u{180}', '\u{24F}'),
    ("IPAExtensions", '\u{250}', '\u{2AF}'),
    ("SpacingModifierLetters", '\u{2B0}', '\u{2FF}'),
    ("CombiningDiacriticalMarks", '\u{300}', '\u{36F}'),
    ("Greek", '\u{370}', '\u{3FF}'),
    ("Cyrillic", '\u{400}', '\u{4FF}'),
    ("Armenian", '\u{530}', '\u{58F}'),
    ("Hebrew", '\u{590}', '\u{5FF}'),
    ("Arabic", '\u{600}', '\u{6FF}'),
    ("Syriac", '\u{700}', '\u{74F}'),
    ("Thaana", '\u{780}', '\u{7BF}'),
    ("Devanagari", '\u{900}', '\u{97F}'),
    ("Bengali", '\u{980}', '\u{9FF}'),
    ("Thai", '\u{E00}', '\u{E7F}'),
    ("Lao", '\u{E80}', '\u{EFF}'),
    ("Tibetan", '\u{F00}', '\u{FFF}'),
    ("Georgian", '\u{10A0}', '\u{10FF}'),
    ("HangulJamo", '\u{1100}', '\u{11FF}'),
    ("Ogham", '\u{1680}', '\u{169F}'),
    ("Runic", '\u{16A0}', '\u{16FF}'),
    ("LatinExtendedAdditional", '\u{1E00}', '\u{1EFF}'),
    ("GreekExtended", '\u{1F00}', '\u{1FFF}'),
    ("GeneralPunctuation", '\u{2000}', '\u{206F}'),
    ("SuperscriptsandSubscripts", '\u{2070}', '\u{209F}'),
    ("CurrencySymbols", '\u{20A0}', '\u{20CF}'),
    ("CombiningMarksforSymbols", '\u{20D0}', '\u{20FF}'),
    ("LetterlikeSymbols", '\u{2100}', '\u{214F}'),
    ("NumberForms", '\u{2150}', '\u{218F}'),
    ("Arrows", '\u{2190}', '\u{21FF}'),
    ("MathematicalOperators", '\u{2200}', '\u{22FF}'),
    ("MiscellaneousTechnical", '\u{2300}', '\u{23FF}'),
    ("EnclosedAlphanumerics", '\u{2460}', '\u{24FF}'),
    ("BoxDrawing", '\u{2500}', '\u{257F}'),
    ("BlockElements", '\u{2580}', '\u{259F}'),
    ("GeometricShapes", '\u{25A0}', '\u{25FF}'),
    ("MiscellaneousSymbols", '\u{2600}', '\u{26FF}'),
    ("Dingbats", '\u{2700}', '\u{27BF}'),
    ("CJKSymbolsandPunctuation", '\u{3000}', '\u{303F}'),
    ("Hiragana", '\u{3040}', '\u{309F}'),
    ("Katakana", '\u{30A0}', '\u{30FF}'),
    ("CJKUnifiedIdeographsExtensionA", '\u{3400}', '\u{4DBF}'),
    ("CJKUnifiedIdeographs", '\u{4E00}', '\u{9FFF}'),
    ("HangulSyllables", '\u{AC00}', '\u{D7AF}'),
    ("PrivateUse", '\u{E000}', '\u{F8FF}'),
    ("CJKCompatibilityIdeographs", '\u{F900}', '\u{FAFF}'),
    ("AlphabeticPresentationForms", '\u{FB00}', '\u{FB4F}'),
    ("CombiningHalfMarks", '\u{FE20}', '\u{FE2F}'),
    ("HalfwidthandFullwidthForms", '\u{FF00}', '\u{FFEF}'),
    ("Specials", '\u{FFF0}', '\u{FFFF}'),
];

/// Look up the range of a block by the name used in `\p{IsXXX}`.
pub fn search_block_range(name: &str) -> Option<(char, char)> {
    BLOCKS
        .iter()
        .find(|&&(block, _, _)| block == name)
        .map(|&(_, start, end)| (start, end))
}

/// Normalized ranges of general categories, computed on first use.
///
/// Major categories (`L`, `M`, ...) and `Cn` are unions/complements of the
/// minor ones, so they are cached after the first request.
#[derive(Debug, Default)]
pub struct CategoryTable {
    cache: RwLock<HashMap<String, Arc<[(char, char)]>>>,
}

impl CategoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `None` if `name` is not a general category name.
    pub fn category(&self, name: &str) -> Option<Arc<[(char, char)]>> {
        if let Some(ranges) = self
            .cache
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .get(name)
        {
            return Some(ranges.clone());
        }

        let ranges: Arc<[(char, char)]> = match name {
            "L" | "M" | "N" | "P" | "Z" | "S" | "C" => normalize_ranges(
                CATEGORIES
                    .iter()
                    .filter(|(category, _)| category.starts_with(name))
                    .flat_map(|(_, table)| table.iter().copied()),
            )
            .into(),
            "Cn" => complement_ranges(
                CATEGORIES
                    .iter()
                    .flat_map(|(_, table)| table.iter().copied()),
            )
            .into(),
            _ => {
                let &(_, table) = CATEGORIES.iter().find(|(category, _)| *category == name)?;
                normalize_ranges(table.iter().copied()).into()
            }
        };
        self.cache
            .write()
            .unwrap_or_else(|err| err.into_inner())
            .insert(name.to_owned(), ranges.clone());
        Some(ranges)
    }

    pub fn cached_count(&self) -> usize {
        self.cache
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::contains;

    #[test]
    fn category_tests() {
        let table = CategoryTable::new();
        let lu = table.category("Lu").unwrap();
        assert!(contains(&lu, 'Q'));
        assert!(!contains(&lu, 'q'));
        let l = table.category("L").unwrap();
        assert!(contains(&l, 'q'));
        assert!(contains(&l, '\u{3042}'));
        let cn = table.category("Cn").unwrap();
        assert!(!contains(&cn, 'a'));
        assert!(table.category("Xx").is_none());
        assert_eq!(table.cached_count(), 3);
        table.category("Lu").unwrap();
        assert_eq!(table.cached_count(), 3);
    }

    #[test]
    fn block_tests() {
        assert_eq!(search_block_range("BasicLatin"), Some(('\0', '\u{7F}')));
        assert_eq!(search_block_range("Latin-1Supplement"), Some(('\u{80}', '\u{FF}')));
        assert_eq!(search_block_range("Klingon"), None);
    }
}
