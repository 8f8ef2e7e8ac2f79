/// Exports the ABI marker and registration entry point from a plugin `cdylib`.
///
/// Every listed type must implement [`DeclaredPlugin`](crate::DeclaredPlugin).
/// The host calls the generated `register_plugins` symbol once per artifact
/// and instantiates each declared type itself.
///
/// ```rust,ignore
/// use plugin_api::*;
///
/// struct GreeterPlugin;
///
/// impl Plugin for GreeterPlugin { /* hooks */ }
///
/// impl DeclaredPlugin for GreeterPlugin {
///     fn details() -> PluginDetails {
///         PluginDetails::new("greeter", "Greeter").author("Horizon Team")
///     }
///
///     fn create() -> Result<Self, PluginError> {
///         Ok(GreeterPlugin)
///     }
/// }
///
/// declare_plugins!(GreeterPlugin);
/// ```
///
/// The entry point catches panics raised while declaring types so that they
/// never unwind across the FFI boundary; the host sees `false` instead.
#[macro_export]
macro_rules! declare_plugins {
    ($($plugin_type:ty),+ $(,)?) => {
        #[no_mangle]
        pub extern "C" fn plugin_abi_version() -> *const ::std::os::raw::c_char {
            $crate::PLUGIN_ABI_VERSION.as_ptr() as *const ::std::os::raw::c_char
        }

        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn register_plugins(registrar: &mut $crate::PluginRegistrar) -> bool {
            ::std::panic::catch_unwind(::std::panic::AssertUnwindSafe(|| {
                $( registrar.declare_type::<$plugin_type>(); )+
            }))
            .is_ok()
        }
    };
}
