//! Cache of executable predicates.
//!
//! [`PredicateCache`] avoids recompiling the same predicate for the same
//! schema. Entries are keyed by an `FxHash` of the `Debug` form of both; a
//! parameter reference prints its slot address, so trees bound to different
//! parameter arrays never share an entry. Interpreted fallbacks are cached too,
//! so a predicate that cannot be compiled is only attempted once.
//!
//! Eviction is FIFO. Evicted compiled code stays in the context's compilation
//! unit until the context is dropped.

use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use fxhash::{FxHashMap, FxHasher};

use super::context::CodegenContext;
use super::fallback::ExecutablePredicate;
use crate::expr::Expr;
use crate::tuple::TupleSchema;

struct CacheEntry<'ctx> {
    schema: TupleSchema,
    expr: Expr,
    predicate: Arc<ExecutablePredicate<'ctx>>,
}

/// Hit / miss / eviction counters of a [`PredicateCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheSnapshot {
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups that compiled.
    pub misses: u64,
    /// Entries dropped to stay within capacity.
    pub evictions: u64,
    /// Current number of entries.
    pub entries: usize,
}

impl CacheSnapshot {
    /// Fraction of lookups served from the cache, 0.0 when there were none.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// FIFO cache of predicates compiled by one [`CodegenContext`].
pub struct PredicateCache<'ctx> {
    ctx: &'ctx CodegenContext,
    entries: FxHashMap<u64, CacheEntry<'ctx>>,
    insertion_order: VecDeque<u64>,
    capacity: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<'ctx> PredicateCache<'ctx> {
    /// Creates a cache holding up to `ctx.config().cache_capacity` entries.
    ///
    /// A capacity of zero disables caching; every lookup compiles.
    #[must_use]
    pub fn new(ctx: &'ctx CodegenContext) -> Self {
        Self::with_capacity(ctx, ctx.config().cache_capacity)
    }

    /// Creates a cache holding up to `capacity` entries.
    #[must_use]
    pub fn with_capacity(ctx: &'ctx CodegenContext, capacity: usize) -> Self {
        Self {
            ctx,
            entries: FxHashMap::default(),
            insertion_order: VecDeque::new(),
            capacity,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Returns the cached predicate for `(schema, expr)`, or compiles it.
    ///
    /// # Panics
    ///
    /// Panics on a verification failure under
    /// [`VerifierPolicy::Panic`](super::VerifierPolicy::Panic).
    pub fn get_or_compile(
        &mut self,
        schema: &TupleSchema,
        expr: &Expr,
    ) -> Arc<ExecutablePredicate<'ctx>> {
        let key = cache_key(schema, expr);

        if let Some(entry) = self.entries.get(&key) {
            if entry.schema == *schema && entry.expr == *expr {
                self.hits += 1;
                return Arc::clone(&entry.predicate);
            }
        }
        self.misses += 1;

        let predicate = Arc::new(ExecutablePredicate::try_compile(self.ctx, schema, expr));
        if self.capacity == 0 {
            return predicate;
        }

        if !self.entries.contains_key(&key) {
            if self.entries.len() >= self.capacity {
                self.evict_oldest();
            }
            self.insertion_order.push_back(key);
        }
        self.entries.insert(
            key,
            CacheEntry {
                schema: schema.clone(),
                expr: expr.clone(),
                predicate: Arc::clone(&predicate),
            },
        );
        predicate
    }

    fn evict_oldest(&mut self) {
        if let Some(oldest) = self.insertion_order.pop_front() {
            self.entries.remove(&oldest);
            self.evictions += 1;
            tracing::trace!(key = oldest, "evicted cached predicate");
        }
    }

    /// Returns the number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clears all cached entries. Counters are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.insertion_order.clear();
    }

    /// Returns the current counters.
    #[must_use]
    pub fn snapshot(&self) -> CacheSnapshot {
        CacheSnapshot {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            entries: self.entries.len(),
        }
    }
}

impl std::fmt::Debug for PredicateCache<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredicateCache")
            .field("entries", &self.entries.len())
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

fn cache_key(schema: &TupleSchema, expr: &Expr) -> u64 {
    let mut hasher = FxHasher::default();
    format!("{schema:?}").hash(&mut hasher);
    format!("{expr:?}").hash(&mut hasher);
    hasher.finish()
}
