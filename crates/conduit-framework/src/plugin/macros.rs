// ─── register_plugin! ────────────────────────────────────────────────────────

/// Registers a plugin at link time so [`LinkedSource`] discovers it.
///
/// The plugin type must implement [`Plugin`] and [`Default`].  Fields after
/// `plugin` are optional but must appear in the order shown.
///
/// ```rust,ignore
/// register_plugin! {
///     CONVERSATIONS = {
///         name: "conversations",
///         plugin: ConversationsPlugin,
///         depends_on: ["chroma", "config"],
///         priority: 20,
///         version: "1.2.0",
///         description: "Conversation export tooling",
///     }
/// }
/// ```
///
/// | Field | Default |
/// |-------|---------|
/// | `depends_on` | `[]` |
/// | `priority` | `100` |
/// | `version` | `CARGO_PKG_VERSION` of the registering crate |
/// | `description` | `""` |
///
/// [`LinkedSource`]: crate::plugin::LinkedSource
/// [`Plugin`]: crate::plugin::Plugin
#[macro_export]
macro_rules! register_plugin {
    (
        $(#[$attr:meta])*
        $static_name:ident = {
            name: $name:literal,
            plugin: $plugin:ty
            $(, depends_on: [$($dep:literal),* $(,)?])?
            $(, priority: $priority:expr)?
            $(, version: $version:expr)?
            $(, description: $description:expr)?
            $(,)?
        }
    ) => {
        $(#[$attr])*
        #[$crate::__linkme::distributed_slice($crate::plugin::PLUGIN_ENTRIES)]
        #[linkme(crate = $crate::__linkme)]
        static $static_name: $crate::plugin::PluginEntry = {
            fn __create() -> ::std::result::Result<
                ::std::sync::Arc<dyn $crate::plugin::Plugin>,
                $crate::__core::BoxError,
            > {
                let plugin: $plugin = ::std::default::Default::default();
                let plugin: ::std::sync::Arc<dyn $crate::plugin::Plugin> =
                    ::std::sync::Arc::new(plugin);
                ::std::result::Result::Ok(plugin)
            }

            $crate::plugin::PluginEntry {
                api_version: $crate::plugin::CONDUIT_PLUGIN_API_VERSION,
                name: $name,
                depends_on: &[$($($dep),*)?],
                priority: $crate::__or_default!(100 $(, $priority)?),
                version: $crate::__or_default!(env!("CARGO_PKG_VERSION") $(, $version)?),
                description: $crate::__or_default!("" $(, $description)?),
                create: __create,
            }
        };
    };
}

/// Picks the explicit value when one was given.
#[macro_export]
#[doc(hidden)]
macro_rules! __or_default {
    ($default:expr) => {
        $default
    };
    ($default:expr, $value:expr) => {
        $value
    };
}
