//! # Logging
//!
//! Compile-time filtered log macros. The level is chosen with Cargo
//! features and disabled levels compile to nothing:
//!
//! - `no_logs`:   no output at all
//! - `log_info`:  `co_error!`, `co_warn!`, `co_info!` (default)
//! - `log_trace`: adds `co_debug!` and `co_trace!`
//!
//! On bare metal, output goes to the debugger via semihosting when the
//! `semihosting` feature is on and is discarded otherwise. Host test
//! builds print to stderr.
//!
//! ```ignore
//! co_info!("created {} ({} bytes)", id, size);
//! ```

use core::fmt;

pub const P_ERROR: &str = "[ERRO] ";
pub const P_WARN: &str = "[WARN] ";
pub const P_INFO: &str = "[INFO] ";
pub const P_DEBUG: &str = "[DEBG] ";
pub const P_TRACE: &str = "[TRAC] ";

#[doc(hidden)]
pub fn emit(prefix: &str, args: fmt::Arguments<'_>) {
    #[cfg(test)]
    std::eprintln!("{}{}", prefix, args);

    #[cfg(all(
        not(test),
        target_arch = "arm",
        target_os = "none",
        feature = "semihosting"
    ))]
    cortex_m_semihosting::hprintln!("{}{}", prefix, args);

    #[cfg(not(any(
        test,
        all(target_arch = "arm", target_os = "none", feature = "semihosting")
    )))]
    let _ = (prefix, args);
}

#[cfg(not(feature = "no_logs"))]
#[macro_export]
macro_rules! co_error {
    ($($arg:tt)*) => {
        $crate::log::emit($crate::log::P_ERROR, format_args!($($arg)*))
    };
}

#[cfg(feature = "no_logs")]
#[macro_export]
macro_rules! co_error {
    ($($arg:tt)*) => {
        if false {
            $crate::log::emit("", format_args!($($arg)*))
        }
    };
}

#[cfg(not(feature = "no_logs"))]
#[macro_export]
macro_rules! co_warn {
    ($($arg:tt)*) => {
        $crate::log::emit($crate::log::P_WARN, format_args!($($arg)*))
    };
}

#[cfg(feature = "no_logs")]
#[macro_export]
macro_rules! co_warn {
    ($($arg:tt)*) => {
        if false {
            $crate::log::emit("", format_args!($($arg)*))
        }
    };
}

#[cfg(not(feature = "no_logs"))]
#[macro_export]
macro_rules! co_info {
    ($($arg:tt)*) => {
        $crate::log::emit($crate::log::P_INFO, format_args!($($arg)*))
    };
}

#[cfg(feature = "no_logs")]
#[macro_export]
macro_rules! co_info {
    ($($arg:tt)*) => {
        if false {
            $crate::log::emit("", format_args!($($arg)*))
        }
    };
}

#[cfg(all(feature = "log_trace", not(feature = "no_logs")))]
#[macro_export]
macro_rules! co_debug {
    ($($arg:tt)*) => {
        $crate::log::emit($crate::log::P_DEBUG, format_args!($($arg)*))
    };
}

#[cfg(not(all(feature = "log_trace", not(feature = "no_logs"))))]
#[macro_export]
macro_rules! co_debug {
    ($($arg:tt)*) => {
        if false {
            $crate::log::emit("", format_args!($($arg)*))
        }
    };
}

#[cfg(all(feature = "log_trace", not(feature = "no_logs")))]
#[macro_export]
macro_rules! co_trace {
    ($($arg:tt)*) => {
        $crate::log::emit($crate::log::P_TRACE, format_args!($($arg)*))
    };
}

#[cfg(not(all(feature = "log_trace", not(feature = "no_logs"))))]
#[macro_export]
macro_rules! co_trace {
    ($($arg:tt)*) => {
        if false {
            $crate::log::emit("", format_args!($($arg)*))
        }
    };
}
