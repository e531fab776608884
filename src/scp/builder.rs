//! Fluent builder for `ScpEngine`, in the same style as the teacher's
//! `SlotDriverBuilder`/`LocalNodeBuilder`: optional fields, a chained setter
//! per field, and a `build()` that reports the first missing requirement.

use crate::value::NominationValue;

use super::driver::ScpDriver;
use super::engine::ScpEngine;
use super::local_node::LocalNode;

pub struct ScpEngineBuilder<V: NominationValue, D: ScpDriver<V>> {
    local_node: Option<LocalNode>,
    driver: Option<D>,
    _marker: std::marker::PhantomData<V>,
}

impl<V: NominationValue, D: ScpDriver<V>> Default for ScpEngineBuilder<V, D> {
    fn default() -> Self {
        ScpEngineBuilder { local_node: None, driver: None, _marker: std::marker::PhantomData }
    }
}

impl<V: NominationValue, D: ScpDriver<V>> ScpEngineBuilder<V, D> {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn local_node(mut self, local_node: LocalNode) -> Self {
        self.local_node = Some(local_node);
        self
    }

    pub fn driver(mut self, driver: D) -> Self {
        self.driver = Some(driver);
        self
    }

    pub fn build(self) -> Result<ScpEngine<V, D>, &'static str> {
        let local_node = self.local_node.ok_or("missing local node")?;
        let driver = self.driver.ok_or("missing driver")?;
        Ok(ScpEngine::new(local_node, driver))
    }
}
