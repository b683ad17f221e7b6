//! Logging macros that build for both the board and the host.
//!
//! Board builds forward to `defmt`. Host builds link no defmt logger, so unit tests print to
//! stdout and everything else type-checks the message and drops it.

macro_rules! log_info {
    ($($arg:tt)*) => {{
        #[cfg(not(feature = "host"))]
        ::defmt::info!($($arg)*);

        #[cfg(all(feature = "host", test))]
        ::std::println!("[INFO] {}", ::core::format_args!($($arg)*));

        #[cfg(all(feature = "host", not(test)))]
        let _ = ::core::format_args!($($arg)*);
    }};
}
pub(crate) use log_info;

macro_rules! log_debug {
    ($($arg:tt)*) => {{
        #[cfg(not(feature = "host"))]
        ::defmt::debug!($($arg)*);

        #[cfg(all(feature = "host", test))]
        ::std::println!("[DEBUG] {}", ::core::format_args!($($arg)*));

        #[cfg(all(feature = "host", not(test)))]
        let _ = ::core::format_args!($($arg)*);
    }};
}
pub(crate) use log_debug;
