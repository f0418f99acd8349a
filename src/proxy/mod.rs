//! Proxy Dispatcher
//!
//! Binds a logical interface (library name + method list) to resolved
//! symbols and forwards each method invocation to a cached call site.
//!
//! Interfaces are plain data ([`InterfaceDefinition`]); the
//! [`native_interface!`](crate::native_interface) macro generates a typed
//! forwarding wrapper around a [`Dispatcher`] for each declared interface.

mod definition;
mod dispatcher;

pub use definition::{InterfaceDefinition, MethodDefinition};
pub use dispatcher::{Dispatcher, DispatcherCache, HASH_CODE, TO_STRING};

/// Declare a native interface and generate its forwarding type.
///
/// ```ignore
/// native_interface! {
///     pub struct Stdlib in "c" {
///         fn strlen(LogicalType::STRING) -> LogicalType::I64;
///         fn printf(LogicalType::STRING) variadic(LogicalType::Any) -> LogicalType::I32;
///         fn free(LogicalType::Pointer);
///     }
/// }
///
/// let stdlib = Stdlib::load(&context)?;
/// let len = stdlib.strlen(&mut [Value::from("hello")])?;
/// ```
///
/// Overloaded methods cannot share a generated method name; build the
/// [`InterfaceDefinition`] directly for those.
#[macro_export]
macro_rules! native_interface {
    (@ret) => { None };
    (@ret $ret:expr) => { Some($ret) };
    (@sig [$($param:expr),*] variadic($element:expr) $(-> $ret:expr)?) => {
        $crate::callsite::FunctionSignature::variadic(
            vec![$($param),*],
            $element,
            $crate::native_interface!(@ret $($ret)?),
        )
    };
    (@sig [$($param:expr),*] $(-> $ret:expr)?) => {
        $crate::callsite::FunctionSignature::new(
            vec![$($param),*],
            $crate::native_interface!(@ret $($ret)?),
        )
    };
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident in $library:literal {
            $(
                fn $method:ident ( $($param:expr),* $(,)? )
                    $(variadic($element:expr))?
                    $(-> $ret:expr)?;
            )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone)]
        $vis struct $name {
            dispatcher: ::std::sync::Arc<$crate::proxy::Dispatcher>,
        }

        #[allow(dead_code)]
        impl $name {
            /// Interface definition this type forwards to
            pub fn definition() -> $crate::proxy::InterfaceDefinition {
                $crate::proxy::InterfaceDefinition::new(stringify!($name), $library)
                $(
                    .method(
                        stringify!($method),
                        $crate::native_interface!(
                            @sig [$($param),*] $(variadic($element))? $(-> $ret)?
                        ),
                    )
                )*
            }

            /// Bind through `context`, reusing its cached dispatcher
            pub fn load(context: &$crate::NativeContext) -> $crate::Result<Self> {
                Ok(Self {
                    dispatcher: context.load(&Self::definition())?,
                })
            }

            /// Wrap an already bound dispatcher
            pub fn from_dispatcher(dispatcher: ::std::sync::Arc<$crate::proxy::Dispatcher>) -> Self {
                Self { dispatcher }
            }

            pub fn dispatcher(&self) -> &::std::sync::Arc<$crate::proxy::Dispatcher> {
                &self.dispatcher
            }

            pub fn hash_code(&self) -> i64 {
                self.dispatcher.hash_code()
            }

            $(
                pub fn $method(
                    &self,
                    args: &mut [$crate::Value],
                ) -> $crate::Result<Option<$crate::Value>> {
                    self.dispatcher.invoke(stringify!($method), args)
                }
            )*
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                ::std::fmt::Display::fmt(&*self.dispatcher, f)
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                ::std::fmt::Debug::fmt(&*self.dispatcher, f)
            }
        }
    };
}
