//! Per-type die cache
//!
//! Built eagerly when a simulation is created so that a broken die type fails
//! before any roll starts. Read-only afterwards.

use std::sync::Arc;

use super::{DieSpec, DieType};
use crate::error::DiceResult;

/// One shared [`DieSpec`] per [`DieType`]
#[derive(Debug, Clone)]
pub struct DieRegistry {
    radius: f32,
    specs: Vec<Arc<DieSpec>>,
}

impl DieRegistry {
    /// Build every die type at the given circumradius
    pub fn new(radius: f32) -> DiceResult<Self> {
        let specs = DieType::ALL
            .iter()
            .map(|&die_type| DieSpec::build(die_type, radius).map(Arc::new))
            .collect::<DiceResult<Vec<_>>>()?;
        log::debug!("die registry ready: {} types at radius {}", specs.len(), radius);
        Ok(Self { radius, specs })
    }

    #[inline]
    pub fn get(&self, die_type: DieType) -> &Arc<DieSpec> {
        &self.specs[die_type.index()]
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<DieSpec>> {
        self.specs.iter()
    }
}
