//! Macro support for domain port error enums.
//!
//! Every port pairs a small `thiserror` enum with constructors that take
//! `impl Into<...>` per field, so adapters can write
//! `SessionRepositoryError::query("claim statement failed")` without
//! spelling out struct variants. `define_port_error!` generates both halves
//! from one declaration:
//!
//! ```ignore
//! define_port_error! {
//!     /// Errors raised by session repository adapters.
//!     pub enum SessionRepositoryError {
//!         /// Repository connection could not be established.
//!         Connection { message: String } =>
//!             "session repository connection failed: {message}",
//!         /// Query or mutation failed during execution.
//!         Query { message: String } =>
//!             "session repository query failed: {message}",
//!     }
//! }
//! ```

macro_rules! define_port_error {
    (
        $(#[$enum_meta:meta])*
        pub enum $name:ident {
            $(
                $(#[$var_meta:meta])*
                $variant:ident $( { $($field:ident : $ty:ty),* $(,)? } )? => $display:expr
            ),* $(,)?
        }
    ) => {
        $(#[$enum_meta])*
        #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
        pub enum $name {
            $(
                $(#[$var_meta])*
                #[error($display)]
                $variant $( { $($field : $ty),* } )?,
            )*
        }

        impl $name {
            $(
                define_port_error!(@ctor $variant $( { $($field : $ty),* } )?);
            )*
        }
    };

    (@ctor $variant:ident) => {
        ::paste::paste! {
            pub fn [<$variant:snake>]() -> Self {
                Self::$variant
            }
        }
    };

    (@ctor $variant:ident { $($field:ident : $ty:ty),* $(,)? }) => {
        define_port_error!(@ctor_fields $variant () () $( $field : $ty, )*);
    };

    // Each field folds into the signature as `impl Into<T>` and into the
    // struct literal as `field.into()`.
    (@ctor_fields $variant:ident ($($sig:tt)*) ($($build:tt)*) $field:ident : $ty:ty, $($rest:tt)*) => {
        define_port_error!(
            @ctor_fields
            $variant
            ($($sig)* $field: impl Into<$ty>,)
            ($($build)* $field: $field.into(),)
            $($rest)*
        );
    };

    (@ctor_fields $variant:ident ($($sig:tt)*) ($($build:tt)*) ) => {
        ::paste::paste! {
            pub fn [<$variant:snake>]($($sig)*) -> Self {
                Self::$variant { $($build)* }
            }
        }
    };
}

pub(crate) use define_port_error;
