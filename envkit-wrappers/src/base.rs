//! Composition of wrapper chains.
//!
//! Every wrapper in this crate is generic over its inner [`Environment`] and
//! re-implements the full trait, forwarding whatever it does not override.
//! For chains assembled at runtime the environment is boxed and wrappers are
//! applied through [`wrap_all`].
use anyhow::Result;
use envkit_core::Environment;
use log::info;

/// A type-erased environment, the unit of runtime composition.
pub type BoxedEnvironment = Box<dyn Environment>;

/// A constructor turning an environment into a wrapped environment.
pub type WrapperCtor = Box<dyn FnOnce(BoxedEnvironment) -> Result<BoxedEnvironment>>;

/// Applies constructors in order, innermost first.
///
/// The last constructor in the list produces the outermost layer. Validation
/// happens inside each constructor; this function only threads the chain.
pub fn wrap_all(base: BoxedEnvironment, ctors: Vec<WrapperCtor>) -> Result<BoxedEnvironment> {
    let n = ctors.len();
    let mut env = base;
    for ctor in ctors {
        env = ctor(env)?;
    }
    info!("Composed a chain of {} wrappers", n);
    Ok(env)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CanonicalSpecWrapper, StepLimitWrapper, ValidateActionSpecWrapper};
    use envkit_core::testing::{EchoEnv, CONTROL_TIMESTEP};

    #[test]
    fn test_wrap_all_applies_in_order() {
        let base: BoxedEnvironment = Box::new(EchoEnv::new(1, -2.0, 2.0));
        let env = wrap_all(
            base,
            vec![
                CanonicalSpecWrapper::ctor(Default::default()),
                ValidateActionSpecWrapper::ctor(),
                StepLimitWrapper::ctor(Default::default()),
            ],
        )
        .unwrap();
        // The outermost layer advertises the canonical bounds.
        let spec = env.action_spec();
        let leaf = spec.as_leaf().unwrap();
        assert_eq!(leaf.minimum().unwrap().iter().next(), Some(&-1.0));
        assert_eq!(leaf.maximum().unwrap().iter().next(), Some(&1.0));
    }

    #[test]
    fn test_base_capability_reachable_three_layers_deep() {
        let base: BoxedEnvironment = Box::new(EchoEnv::new(1, -2.0, 2.0));
        let mut env = wrap_all(
            base,
            vec![
                CanonicalSpecWrapper::ctor(Default::default()),
                ValidateActionSpecWrapper::ctor(),
                StepLimitWrapper::ctor(Default::default()),
            ],
        )
        .unwrap();
        // control_timestep and random_state are defined only on the base.
        assert_eq!(env.control_timestep(), Some(CONTROL_TIMESTEP));
        assert!(env.random_state().is_some());
    }
}
