//! examples of usage of RustedDAE
/// DAE and stiff ODE examples
pub mod dae_examples;
