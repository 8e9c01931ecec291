//! Plan cache keyed by `(type, compile options)`
//!
//! Plans are built at most once per key and never evicted. Runtime options
//! are not part of the key.

use super::compiled::Plan;
use super::model::Record;
use crate::config::CompileOptions;
use crate::error::MaterializeError;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PlanKey {
    type_id: TypeId,
    options: CompileOptions,
}

type ErasedPlan = Arc<dyn Any + Send + Sync>;

#[derive(Default)]
pub struct PlanCache {
    plans: RwLock<HashMap<PlanKey, ErasedPlan>>,
}

impl PlanCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached plan for `T` under `options`, building it on first use
    pub fn get_or_build<T: Record>(&self, options: &CompileOptions) -> Result<Arc<Plan<T>>, MaterializeError> {
        let key = PlanKey {
            type_id: TypeId::of::<T>(),
            options: options.clone(),
        };

        let cached = self
            .plans
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned();
        if let Some(plan) = cached {
            tracing::trace!(type_name = std::any::type_name::<T>(), "plan cache hit");
            return Ok(downcast(plan));
        }

        // Built outside the lock; a racing builder loses and its plan is dropped
        tracing::debug!(type_name = std::any::type_name::<T>(), "plan cache miss");
        let built: ErasedPlan = Arc::new(Plan::<T>::build(options)?);
        let plan = self
            .plans
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_insert(built)
            .clone();
        Ok(downcast(plan))
    }

    /// Number of cached plans
    pub fn len(&self) -> usize {
        self.plans.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for PlanCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanCache").field("plans", &self.len()).finish()
    }
}

fn downcast<T: Record>(plan: ErasedPlan) -> Arc<Plan<T>> {
    match plan.downcast::<Plan<T>>() {
        Ok(plan) => plan,
        Err(_) => unreachable!("plan cache entries are keyed by TypeId"),
    }
}
