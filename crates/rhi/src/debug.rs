//! Validation-layer diagnostics hook.
//!
//! A [`DebugMessenger`] forwards validation messages to a [`DiagnosticSink`].
//! It is optional: nothing else in the workspace depends on it being present.

use std::borrow::Cow;
use std::ffi::{CStr, c_void};
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info, trace, warn};

use crate::error::RhiResult;
use crate::instance::Instance;

/// Severity of a diagnostic message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum DiagnosticSeverity {
    Verbose,
    Info,
    Warning,
    Error,
}

impl DiagnosticSeverity {
    /// Maps the most severe bit of a Vulkan severity mask.
    pub fn from_vk(flags: vk::DebugUtilsMessageSeverityFlagsEXT) -> Self {
        if flags.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
            Self::Error
        } else if flags.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
            Self::Warning
        } else if flags.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
            Self::Info
        } else {
            Self::Verbose
        }
    }
}

/// Message category, mirroring `VkDebugUtilsMessageTypeFlagsEXT`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiagnosticKind {
    General,
    Validation,
    Performance,
    Other,
}

impl DiagnosticKind {
    pub fn from_vk(flags: vk::DebugUtilsMessageTypeFlagsEXT) -> Self {
        if flags.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
            Self::Validation
        } else if flags.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
            Self::Performance
        } else if flags.contains(vk::DebugUtilsMessageTypeFlagsEXT::GENERAL) {
            Self::General
        } else {
            Self::Other
        }
    }
}

/// Receiver for validation-layer output.
pub trait DiagnosticSink: Send + Sync {
    fn message(&self, severity: DiagnosticSeverity, kind: DiagnosticKind, text: &str);
}

/// Default sink: writes every message through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn message(&self, severity: DiagnosticSeverity, kind: DiagnosticKind, text: &str) {
        match severity {
            DiagnosticSeverity::Error => error!("[Vulkan {:?}] {}", kind, text),
            DiagnosticSeverity::Warning => warn!("[Vulkan {:?}] {}", kind, text),
            DiagnosticSeverity::Info => info!("[Vulkan {:?}] {}", kind, text),
            DiagnosticSeverity::Verbose => trace!("[Vulkan {:?}] {}", kind, text),
        }
    }
}

/// RAII wrapper for `VkDebugUtilsMessengerEXT`.
///
/// The instance must outlive the messenger.
pub struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
    // Boxed so the address handed to the driver stays stable.
    sink: Box<Arc<dyn DiagnosticSink>>,
}

impl DebugMessenger {
    /// Attaches `sink` to the instance's validation output.
    ///
    /// Returns `Ok(None)` when the instance was created without validation.
    pub fn new(instance: &Instance, sink: Arc<dyn DiagnosticSink>) -> RhiResult<Option<Self>> {
        if !instance.has_validation() {
            return Ok(None);
        }

        let loader = ash::ext::debug_utils::Instance::new(instance.entry(), instance.handle());
        let sink = Box::new(sink);
        let user_data = &*sink as *const Arc<dyn DiagnosticSink> as *mut c_void;

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback))
            .user_data(user_data);

        let messenger = unsafe { loader.create_debug_utils_messenger(&create_info, None)? };
        info!("Debug messenger created");

        Ok(Some(Self {
            loader,
            messenger,
            sink,
        }))
    }

    /// Returns the sink receiving messages.
    pub fn sink(&self) -> &Arc<dyn DiagnosticSink> {
        &self.sink
    }
}

impl Drop for DebugMessenger {
    fn drop(&mut self) {
        unsafe {
            self.loader
                .destroy_debug_utils_messenger(self.messenger, None);
        }
        debug!("Debug messenger destroyed");
    }
}

/// Called by the validation layer; `user_data` points at the messenger's sink.
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    user_data: *mut c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || user_data.is_null() {
        return vk::FALSE;
    }

    let callback_data = unsafe { &*p_callback_data };
    let message = if callback_data.p_message.is_null() {
        Cow::Borrowed("(no message)")
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message).to_string_lossy() }
    };

    let sink = unsafe { &*(user_data as *const Arc<dyn DiagnosticSink>) };
    sink.message(
        DiagnosticSeverity::from_vk(message_severity),
        DiagnosticKind::from_vk(message_type),
        &message,
    );

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        messages: Mutex<Vec<(DiagnosticSeverity, DiagnosticKind, String)>>,
    }

    impl DiagnosticSink for RecordingSink {
        fn message(&self, severity: DiagnosticSeverity, kind: DiagnosticKind, text: &str) {
            self.messages
                .lock()
                .unwrap()
                .push((severity, kind, text.to_string()));
        }
    }

    #[test]
    fn test_severity_picks_most_severe_bit() {
        let flags = vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR;
        assert_eq!(DiagnosticSeverity::from_vk(flags), DiagnosticSeverity::Error);
        assert_eq!(
            DiagnosticSeverity::from_vk(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE),
            DiagnosticSeverity::Verbose
        );
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            DiagnosticKind::from_vk(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE),
            DiagnosticKind::Performance
        );
        assert_eq!(
            DiagnosticKind::from_vk(vk::DebugUtilsMessageTypeFlagsEXT::empty()),
            DiagnosticKind::Other
        );
    }

    #[test]
    fn test_callback_forwards_to_sink() {
        let recorder = Arc::new(RecordingSink::default());
        let sink: Box<Arc<dyn DiagnosticSink>> = Box::new(recorder.clone());
        let user_data = &*sink as *const Arc<dyn DiagnosticSink> as *mut c_void;

        let data = vk::DebugUtilsMessengerCallbackDataEXT {
            p_message: c"vkQueueSubmit: fence is in use".as_ptr(),
            ..Default::default()
        };

        let result = unsafe {
            debug_callback(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
                &data,
                user_data,
            )
        };

        assert_eq!(result, vk::FALSE);
        let messages = recorder.messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, DiagnosticSeverity::Error);
        assert_eq!(messages[0].1, DiagnosticKind::Validation);
        assert_eq!(messages[0].2, "vkQueueSubmit: fence is in use");
    }

    #[test]
    fn test_callback_ignores_null_data() {
        let result = unsafe {
            debug_callback(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL,
                std::ptr::null(),
                std::ptr::null_mut(),
            )
        };
        assert_eq!(result, vk::FALSE);
    }
}
