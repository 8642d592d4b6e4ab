use std::sync::{
    Arc, PoisonError, RwLock,
    atomic::{AtomicBool, Ordering},
};

use crate::{
    FastHashMap,
    error::XMLError,
    grammar::{Grammar, GrammarKey, GrammarState, GrammarType},
};

/// A store of validated grammars shared between parsers.
pub trait GrammarPool: Send + Sync {
    /// The grammars a parser should start with.
    fn retrieve_initial_grammar_set(&self, grammar_type: GrammarType) -> Vec<Arc<Grammar>>;

    /// Cache `grammars`.
    ///
    /// Either all grammars are cached or none is.
    ///
    /// # Errors
    /// - [`XMLError::GrammarPoolLocked`] if the pool is locked.
    /// - [`XMLError::GrammarDuplicateCache`] if another grammar with the same key exists.
    /// - [`XMLError::GrammarNotMutable`] if some grammar is still being built.
    fn cache_grammars(&self, grammars: &[Arc<Grammar>]) -> Result<(), XMLError>;

    fn retrieve_grammar(&self, key: &GrammarKey) -> Option<Arc<Grammar>>;

    fn contains(&self, key: &GrammarKey) -> bool {
        self.retrieve_grammar(key).is_some()
    }

    fn clear(&self);

    /// Reject further caching until [`GrammarPool::unlock`].
    fn lock(&self);

    fn unlock(&self);

    fn is_locked(&self) -> bool;
}

/// An in-memory [`GrammarPool`].
#[derive(Debug, Default)]
pub struct MemoryGrammarPool {
    grammars: RwLock<FastHashMap<GrammarKey, Arc<Grammar>>>,
    locked: AtomicBool,
}

impl MemoryGrammarPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.grammars
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl GrammarPool for MemoryGrammarPool {
    fn retrieve_initial_grammar_set(&self, grammar_type: GrammarType) -> Vec<Arc<Grammar>> {
        self.grammars
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|grammar| grammar.grammar_type() == grammar_type)
            .cloned()
            .collect()
    }

    fn cache_grammars(&self, grammars: &[Arc<Grammar>]) -> Result<(), XMLError> {
        if self.is_locked() {
            return Err(XMLError::GrammarPoolLocked);
        }
        let mut map = self
            .grammars
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for (i, grammar) in grammars.iter().enumerate() {
            if grammar.state() != GrammarState::Validated {
                return Err(XMLError::GrammarNotMutable);
            }
            let key = grammar.key();
            let conflicts = map
                .get(&key)
                .is_some_and(|cached| !Arc::ptr_eq(cached, grammar))
                || grammars[..i].iter().any(|other| other.key() == key);
            if conflicts {
                return Err(XMLError::GrammarDuplicateCache);
            }
        }
        for grammar in grammars {
            grammar.prebuild_content_models();
            log::debug!("cache grammar {}", grammar.key());
            map.insert(grammar.key(), grammar.clone());
        }
        Ok(())
    }

    fn retrieve_grammar(&self, key: &GrammarKey) -> Option<Arc<Grammar>> {
        self.grammars
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn clear(&self) {
        self.grammars
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn lock(&self) {
        self.locked.store(true, Ordering::Release);
    }

    fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::DTDGrammar;

    fn validated_dtd(system_id: &str) -> Arc<Grammar> {
        let mut dtd = DTDGrammar::new("doc", None, Some(system_id));
        dtd.set_validated();
        Arc::new(dtd.into())
    }

    #[test]
    fn cache_tests() {
        let pool = MemoryGrammarPool::new();
        let a = validated_dtd("a.dtd");
        pool.cache_grammars(&[a.clone()]).unwrap();
        // caching the same grammar again is not a conflict
        pool.cache_grammars(&[a.clone()]).unwrap();
        assert!(pool.contains(&GrammarKey::dtd(Some("a.dtd"))));

        let other_a = validated_dtd("a.dtd");
        let b = validated_dtd("b.dtd");
        assert!(matches!(
            pool.cache_grammars(&[b, other_a]),
            Err(XMLError::GrammarDuplicateCache)
        ));
        // nothing was cached by the failed call
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.retrieve_initial_grammar_set(GrammarType::DTD).len(), 1);
    }

    #[test]
    fn lock_tests() {
        let pool = MemoryGrammarPool::new();
        pool.lock();
        assert!(matches!(
            pool.cache_grammars(&[validated_dtd("a.dtd")]),
            Err(XMLError::GrammarPoolLocked)
        ));
        pool.unlock();
        pool.cache_grammars(&[validated_dtd("a.dtd")]).unwrap();
        pool.clear();
        assert!(pool.is_empty());
    }

    #[test]
    fn building_grammar_tests() {
        let pool = MemoryGrammarPool::new();
        let dtd: Arc<Grammar> = Arc::new(DTDGrammar::new("doc", None, None).into());
        assert!(matches!(
            pool.cache_grammars(&[dtd]),
            Err(XMLError::GrammarNotMutable)
        ));
    }
}
