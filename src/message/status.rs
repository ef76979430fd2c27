//! Controller completion status.

/// Status word reported in every reply header.
///
/// Bit 15 flags that the accompanying log-info word carries a diagnostic
/// code; bits 14..0 hold the status code itself.
///
/// # Examples
///
/// ```
/// use linkframe::message::IocStatus;
///
/// let status = IocStatus::from_wire(0x8066);
/// assert_eq!(status, IocStatus::FC_ABORTED);
/// assert!(status.log_info_available());
/// assert!(!status.is_success());
/// ```
#[derive(Clone, Copy, Debug)]
pub struct IocStatus {
    code: u16,
    log_info_available: bool,
}

const LOG_INFO_AVAILABLE: u16 = 0x8000;
const CODE_MASK: u16 = 0x7FFF;

impl IocStatus {
    /// The operation completed.
    pub const SUCCESS: Self = Self::code(0x0000);
    /// The controller does not implement the function code.
    pub const INVALID_FUNCTION: Self = Self::code(0x0001);
    /// The controller cannot take the request now.
    pub const BUSY: Self = Self::code(0x0002);
    /// The scatter/gather list is malformed.
    pub const INVALID_SGL: Self = Self::code(0x0003);
    /// The controller hit an internal fault.
    pub const INTERNAL_ERROR: Self = Self::code(0x0004);
    /// The controller ran out of resources for the request.
    pub const INSUFFICIENT_RESOURCES: Self = Self::code(0x0006);
    /// A request field holds an unsupported value.
    pub const INVALID_FIELD: Self = Self::code(0x0007);
    /// The request is not valid in the controller's current state.
    pub const INVALID_STATE: Self = Self::code(0x0008);
    /// The operation was aborted.
    pub const FC_ABORTED: Self = Self::code(0x0066);
    /// The responder exchange identifier is not valid.
    pub const FC_RX_ID_INVALID: Self = Self::code(0x0067);
    /// The destination identifier is not valid.
    pub const FC_DID_INVALID: Self = Self::code(0x0068);
    /// The destination node is logged out.
    pub const FC_NODE_LOGGED_OUT: Self = Self::code(0x0069);
    /// The exchange was cancelled by the controller.
    pub const FC_EXCHANGE_CANCELED: Self = Self::code(0x006C);

    /// Build a status from a bare code with the log-info flag clear.
    #[must_use]
    pub const fn code(code: u16) -> Self {
        Self {
            code: code & CODE_MASK,
            log_info_available: false,
        }
    }

    /// Parse the on-wire status word.
    #[must_use]
    pub const fn from_wire(word: u16) -> Self {
        Self {
            code: word & CODE_MASK,
            log_info_available: word & LOG_INFO_AVAILABLE != 0,
        }
    }

    /// Return the on-wire status word.
    #[must_use]
    pub const fn to_wire(self) -> u16 {
        if self.log_info_available {
            self.code | LOG_INFO_AVAILABLE
        } else {
            self.code
        }
    }

    /// Mark the log-info word as meaningful.
    #[must_use]
    pub const fn with_log_info(mut self) -> Self {
        self.log_info_available = true;
        self
    }

    /// Return the status code without the log-info flag.
    #[must_use]
    pub const fn value(self) -> u16 { self.code }

    /// Report whether the log-info word carries a diagnostic code.
    #[must_use]
    pub const fn log_info_available(self) -> bool { self.log_info_available }

    /// Report whether the controller completed the request successfully.
    #[must_use]
    pub const fn is_success(self) -> bool { self.code == 0 }

    /// Report whether the operation ended because it was aborted.
    #[must_use]
    pub const fn is_aborted(self) -> bool {
        self.code == Self::FC_ABORTED.code || self.code == Self::FC_EXCHANGE_CANCELED.code
    }

    fn name(self) -> Option<&'static str> {
        let name = match self.code {
            0x0000 => "success",
            0x0001 => "invalid function",
            0x0002 => "busy",
            0x0003 => "invalid sgl",
            0x0004 => "internal error",
            0x0006 => "insufficient resources",
            0x0007 => "invalid field",
            0x0008 => "invalid state",
            0x0066 => "fc aborted",
            0x0067 => "fc rx_id invalid",
            0x0068 => "fc d_id invalid",
            0x0069 => "fc node logged out",
            0x006C => "fc exchange canceled",
            _ => return None,
        };
        Some(name)
    }
}

// Equality ignores the log-info flag: two replies with the same code report
// the same outcome whether or not a diagnostic word accompanies them.
impl PartialEq for IocStatus {
    fn eq(&self, other: &Self) -> bool { self.code == other.code }
}

impl Eq for IocStatus {}

impl std::hash::Hash for IocStatus {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) { self.code.hash(state); }
}

impl PartialEq<u16> for IocStatus {
    fn eq(&self, other: &u16) -> bool { self.code == other & CODE_MASK }
}

impl std::fmt::Display for IocStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} ({:#06x})", self.code),
            None => write!(f, "{:#06x}", self.code),
        }
    }
}
