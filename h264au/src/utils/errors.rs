#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level {
            return Err($err);
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BitstreamError {
    #[error("NAL unit type {0} is not a coded slice")]
    NotASlice(u8),

    #[error("Exp-Golomb code has more than 31 leading zero bits at bit {0}")]
    MalformedExpGolomb(u64),

    #[error("Bitstream truncated: {0}")]
    Truncated(String),

    #[error("NAL unit has no header byte")]
    EmptyNal,
}

#[derive(thiserror::Error, Debug)]
pub enum AssembleError {
    #[error("Access unit buffer could not grow to {requested} bytes")]
    AllocationFailure { requested: usize },

    #[error("Malformed slice header in NAL at offset {offset}: {source}")]
    MalformedSlice {
        offset: usize,
        #[source]
        source: BitstreamError,
    },

    #[error("Discarded {0} bytes preceding the first start code")]
    OrphanContinuation(usize),
}

/// Reasons the stream gate withholds an access unit before synchronization.
///
/// Not failures: the unit is intentionally discarded and logged at low severity.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDrop {
    #[error("Access unit without IDR slice before first IDR")]
    AwaitingIdr,

    #[error("IDR access unit without SPS/PPS and no saved parameter sets")]
    MissingParameterSets,
}

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("{backend} backend rejected access unit: {reason}")]
    BackendReject { backend: String, reason: String },

    #[error("{backend} backend produced no frame after {units} access units")]
    BackendStall { backend: String, units: u32 },

    #[error("{backend} backend rejected {count} consecutive access units")]
    SustainedReject { backend: String, count: u32 },

    #[error("Failed to open {0} backend")]
    BackendOpen(String),

    #[error("Out of memory while assembling access units")]
    AllocationFailure,

    #[error("Stream undecodable: no decoder backend is left to fall back to")]
    Undecodable,
}
