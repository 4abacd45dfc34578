//! Callback signatures ("func types") understood by the registry.
//!
//! Every signature is a zero-sized marker type implementing [`Signature`],
//! which fixes the argument and return types of callbacks stored under it.
//! [`FuncType`] is the runtime name of a signature; it scopes callback IDs
//! and travels on the wire. [`FuncType::visit`] turns a runtime name back
//! into a statically typed call for code (like the FFI bridge) that only
//! knows the name.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::payload::{
    AssetMissingRequest, ChangeEvent, CheckboxEvent, ComponentEvent, LogMessage, ModuleRunRequest,
    MouseEventInfo, OcioErrorReport, RenderImage, RenderStatistics,
};

/// Static description of one callback shape.
pub trait Signature: Send + Sync + 'static {
    const FUNC_TYPE: FuncType;
    /// Payload the renderer supplies when it fires the callback.
    type Args: Serialize + DeserializeOwned + Send + 'static;
    /// Value sent back to the renderer. `Default` is the answer used when the
    /// callback is gone or panicked.
    type Output: Default + Serialize + DeserializeOwned + Send + 'static;
}

/// Generic code that needs to be run for a signature known only at runtime.
pub trait SignatureVisitor {
    type Output;
    fn visit<S: Signature>(self) -> Self::Output;
}

macro_rules! signatures {
    ($( $(#[$meta:meta])* $name:ident ( $args:ty ) -> $out:ty; )*) => {
        /// Runtime name of a callback signature.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum FuncType {
            $( $name, )*
        }

        impl FuncType {
            pub const ALL: &'static [FuncType] = &[ $( FuncType::$name, )* ];

            pub fn name(self) -> &'static str {
                match self {
                    $( FuncType::$name => stringify!($name), )*
                }
            }

            /// Run `visitor` with the marker type belonging to this name.
            pub fn visit<V: SignatureVisitor>(self, visitor: V) -> V::Output {
                match self {
                    $( FuncType::$name => visitor.visit::<$name>(), )*
                }
            }
        }

        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, Default)]
            pub struct $name;

            impl Signature for $name {
                const FUNC_TYPE: FuncType = FuncType::$name;
                type Args = $args;
                type Output = $out;
            }
        )*
    };
}

signatures! {
    /// A new batch of render results is available.
    OnNewImage(Vec<RenderImage>) -> ();
    /// Rendering stopped because of a device or kernel failure.
    OnRenderFailure(()) -> ();
    OnNewStatistics(RenderStatistics) -> ();
    OnOcioError(OcioErrorReport) -> ();
    /// Resolve a missing asset; an empty string leaves it unresolved.
    AssetMissing(AssetMissingRequest) -> String;
    ApiLog(LogMessage) -> ();
    ChangeObserver(ChangeEvent) -> ();
    ProjectManagerObserver(()) -> ();
    SelectionObserver(()) -> ();
    /// A command module was triggered; return whether it ran.
    CommandModuleRun(ModuleRunRequest) -> bool;
    ButtonClicked(ComponentEvent) -> ();
    ComboBoxChanged(ComponentEvent) -> ();
    TextEditorChanged(ComponentEvent) -> ();
    CheckboxChecked(CheckboxEvent) -> ();
    MouseEvent(MouseEventInfo) -> ();
}

impl fmt::Display for FuncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FuncType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FuncType::ALL
            .iter()
            .copied()
            .find(|ft| ft.name() == s)
            .ok_or_else(|| crate::Error::InvalidArgument(format!("unknown callback type {s:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_from_str() {
        for ft in FuncType::ALL {
            assert_eq!(ft.name().parse::<FuncType>().unwrap(), *ft);
        }
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert!("OnSomethingElse".parse::<FuncType>().is_err());
    }

    #[test]
    fn visitor_reaches_the_marker_type() {
        struct ReportFuncType;
        impl SignatureVisitor for ReportFuncType {
            type Output = FuncType;
            fn visit<S: Signature>(self) -> FuncType {
                S::FUNC_TYPE
            }
        }

        for ft in FuncType::ALL {
            assert_eq!(ft.visit(ReportFuncType), *ft);
        }
    }

    #[test]
    fn serializes_as_plain_name() {
        let json = serde_json::to_string(&FuncType::AssetMissing).unwrap();
        assert_eq!(json, "\"AssetMissing\"");
    }
}
