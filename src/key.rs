//! Key Derivation
//!
//! Turns the argument tuple of a wrapped call into a stable string key.
//!
//! Arguments are serialized through `serde_json::Value`, whose object maps are
//! ordered by key, so two argument tuples produce the same key exactly when
//! their serialized forms are equal (including `HashMap` arguments with
//! different iteration orders). A non-empty tuple always serializes to a JSON
//! array, so its key starts with `[` and can never equal [`EMPTY_ARGS_KEY`].
//!
//! # Failure modes
//! - Arguments whose `Serialize` impl fails (for example maps with non-string
//!   keys) return [`CacheError::KeyDerivation`]; no fallback key is invented.
//! - Non-finite floats (`NaN`, `±inf`) serialize as `null` and therefore share
//!   a key with each other and with `None` in the same position.

use serde::Serialize;

use crate::error::{CacheError, Result};

/// Key used for calls without arguments
pub const EMPTY_ARGS_KEY: &str = "_";

// == Key Args ==
/// Argument tuples accepted by wrapped producers.
///
/// Implemented for `()` and tuples of up to eight serializable elements.
pub trait KeyArgs: Serialize {
    /// Number of arguments in the tuple
    const ARITY: usize;
}

impl KeyArgs for () {
    const ARITY: usize = 0;
}

macro_rules! impl_key_args {
    ($arity:expr => $($name:ident),+) => {
        impl<$($name: Serialize),+> KeyArgs for ($($name,)+) {
            const ARITY: usize = $arity;
        }
    };
}

impl_key_args!(1 => A);
impl_key_args!(2 => A, B);
impl_key_args!(3 => A, B, C);
impl_key_args!(4 => A, B, C, D);
impl_key_args!(5 => A, B, C, D, E);
impl_key_args!(6 => A, B, C, D, E, F);
impl_key_args!(7 => A, B, C, D, E, F, G);
impl_key_args!(8 => A, B, C, D, E, F, G, H);

// == Derive Key ==
/// Derives the cache key for an argument tuple.
pub fn derive_key<A: KeyArgs>(args: &A) -> Result<String> {
    if A::ARITY == 0 {
        return Ok(EMPTY_ARGS_KEY.to_string());
    }

    let canonical = serde_json::to_value(args).map_err(CacheError::KeyDerivation)?;
    serde_json::to_string(&canonical).map_err(CacheError::KeyDerivation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use std::collections::HashMap;

    #[test]
    fn test_zero_args_use_sentinel() {
        assert_eq!(derive_key(&()).unwrap(), EMPTY_ARGS_KEY);
    }

    #[test]
    fn test_single_arg() {
        assert_eq!(derive_key(&("a",)).unwrap(), r#"["a"]"#);
    }

    #[test]
    fn test_type_is_preserved() {
        assert_ne!(derive_key(&(1,)).unwrap(), derive_key(&("1",)).unwrap());
        assert_ne!(derive_key(&(true,)).unwrap(), derive_key(&("true",)).unwrap());
    }

    #[test]
    fn test_order_is_preserved() {
        assert_ne!(derive_key(&(1, 2)).unwrap(), derive_key(&(2, 1)).unwrap());
    }

    #[test]
    fn test_sentinel_not_producible_from_args() {
        assert_ne!(derive_key(&("_",)).unwrap(), EMPTY_ARGS_KEY);
        assert_ne!(derive_key(&((),)).unwrap(), EMPTY_ARGS_KEY);
    }

    #[test]
    fn test_map_order_is_canonical() {
        let mut first = HashMap::new();
        let mut second = HashMap::new();
        for i in 0..32 {
            first.insert(format!("k{}", i), i);
        }
        for i in (0..32).rev() {
            second.insert(format!("k{}", i), i);
        }
        assert_eq!(derive_key(&(first,)).unwrap(), derive_key(&(second,)).unwrap());
    }

    #[test]
    fn test_nested_structs() {
        #[derive(Serialize)]
        struct Query {
            repo: String,
            labels: Vec<String>,
        }

        let a = Query {
            repo: "withastro/astro".into(),
            labels: vec!["bug".into()],
        };
        let b = Query {
            repo: "withastro/astro".into(),
            labels: vec!["bug".into(), "docs".into()],
        };
        assert_ne!(derive_key(&(&a,)).unwrap(), derive_key(&(&b,)).unwrap());
        assert_eq!(derive_key(&(&a, 1)).unwrap(), derive_key(&(&a, 1)).unwrap());
    }

    #[test]
    fn test_non_string_map_keys_fail() {
        let mut map = HashMap::new();
        map.insert((1, 2), "tuple key");
        let result = derive_key(&(map,));
        assert!(matches!(result, Err(CacheError::KeyDerivation(_))));
    }
}
