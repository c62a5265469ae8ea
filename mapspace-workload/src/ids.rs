use std::{fmt, sync::Arc};

// implement a cheap-to-clone symbolic name
// `$norm` is applied to the raw text before it is stored
macro_rules! impl_symbol {
    ($(#[$meta: meta])* $Name: ident, $norm: expr) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $Name(Arc<str>);

        impl $Name {
            pub fn new(name: &str) -> Self {
                let norm: fn(&str) -> String = $norm;
                $Name(Arc::from(norm(name.trim())))
            }
            pub fn as_str(&self) -> &str { &self.0 }
        }

        impl fmt::Display for $Name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl fmt::Debug for $Name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $Name {
            fn from(name: &str) -> Self { $Name::new(name) }
        }

        impl<'de> serde::Deserialize<'de> for $Name {
            fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                let raw = <std::borrow::Cow<'de, str>>::deserialize(d)?;
                Ok($Name::new(&raw))
            }
        }
    };
}

impl_symbol!(
    /// Loop dimension of a layer, e.g. `K` or `OX`. Always upper case.
    LayerDim, |s| s.to_uppercase()
);

impl_symbol!(
    /// One axis of an operational array, e.g. `D1`.
    OADimension, |s| s.to_owned()
);

impl_symbol!(
    /// Tensor role inside a layer equation, e.g. `O`, `W`, `I`.
    LayerOperand, |s| s.to_owned()
);

impl_symbol!(
    /// Operand name on the memory side, e.g. `I1`, `I2`, `O`.
    MemOperand, |s| s.to_owned()
);

impl LayerDim {
    // synthetic dimension used by the flat relevance view
    pub fn suffixed(&self, suffix: &str) -> LayerDim {
        LayerDim(Arc::from(format!("{}{suffix}", self.0)))
    }
}

/// Whether an operand is produced or consumed by its layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandRole {
    Output,
    Input,
}
