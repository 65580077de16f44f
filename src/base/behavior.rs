use std::sync::Arc;

/// Lock-step behaviors common to every tickable component in the simulator.
pub trait ModuleBehaviors {
    /// Advance the component by one cycle.
    fn tick_one(&mut self);

    /// Return the component to its post-construction state.
    fn reset(&mut self) {}
}

/// One-time configuration binding for a module.
pub trait Parameterizable {
    type ConfigType;

    fn conf(&self) -> &Self::ConfigType;

    fn init_conf(&mut self, conf: Arc<Self::ConfigType>);
}
