//! Timing Module
//!
//! Wait-time computation for the protocol state machine.
//!
//! ## Responsibilities
//! - Timeslot length lookup (RF mode x TR series x packet length)
//! - Response wait (default routing formula or FRC formula)
//! - Mandatory pauses after confirmation / response
//! - Per-network timing parameters (see [`TimingParamsStorage`])
//!
//! All results are whole milliseconds; negative pauses clamp to zero.

mod storage;

pub use storage::TimingParamsStorage;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::{CallRequest, Confirmation, DeviceInterface, Value};

/// Extra time added to every response wait (ms)
pub const RESPONSE_WAIT_RESERVE_MS: u64 = 100;

// =============================================================================
// Network characteristics
// =============================================================================

/// RF duty-cycle mode of the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RfMode {
    /// Standard
    Std,
    /// Low power
    Lp,
}

impl std::str::FromStr for RfMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "std" => Ok(RfMode::Std),
            "lp" => Ok(RfMode::Lp),
            other => Err(format!("unknown RF mode: {}", other)),
        }
    }
}

/// Transceiver hardware series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrSeries {
    Tr52x,
    Tr72x,
    Unknown,
}

impl std::str::FromStr for TrSeries {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tr52x" | "52" => Ok(TrSeries::Tr52x),
            "tr72x" | "72" => Ok(TrSeries::Tr72x),
            "unknown" => Ok(TrSeries::Unknown),
            other => Err(format!("unknown TR series: {}", other)),
        }
    }
}

/// Timeslot length in 10 ms units for a packet of `len` bytes
pub fn timeslot_length(rf_mode: RfMode, tr_series: TrSeries, len: usize) -> u8 {
    match (rf_mode, tr_series) {
        (RfMode::Std, TrSeries::Tr72x) => match len {
            0..=18 => 3,
            19..=41 => 4,
            _ => 5,
        },
        (RfMode::Std, _) => match len {
            0..=11 => 3,
            12..=32 => 4,
            33..=53 => 5,
            _ => 6,
        },
        (RfMode::Lp, TrSeries::Tr72x) => match len {
            0..=8 => 8,
            9..=31 => 9,
            _ => 10,
        },
        (RfMode::Lp, _) => match len {
            0..=13 => 8,
            14..=35 => 9,
            _ => 10,
        },
    }
}

/// Time needed to route a packet over `hops` hops (ms)
pub fn routing_time_ms(hops: u8, timeslot: u8) -> u64 {
    (hops as u64 + 1) * timeslot as u64 * 10
}

// =============================================================================
// FRC
// =============================================================================

/// FRC response time configured in the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrcResponseTime {
    Ms40,
    Ms320,
    Ms640,
    Ms1280,
    Ms2560,
    Ms5120,
    Ms10240,
    Ms20480,
}

impl FrcResponseTime {
    const ALL: [FrcResponseTime; 8] = [
        FrcResponseTime::Ms40,
        FrcResponseTime::Ms320,
        FrcResponseTime::Ms640,
        FrcResponseTime::Ms1280,
        FrcResponseTime::Ms2560,
        FrcResponseTime::Ms5120,
        FrcResponseTime::Ms10240,
        FrcResponseTime::Ms20480,
    ];

    pub fn as_millis(self) -> u64 {
        match self {
            FrcResponseTime::Ms40 => 40,
            FrcResponseTime::Ms320 => 320,
            FrcResponseTime::Ms640 => 640,
            FrcResponseTime::Ms1280 => 1280,
            FrcResponseTime::Ms2560 => 2560,
            FrcResponseTime::Ms5120 => 5120,
            FrcResponseTime::Ms10240 => 10240,
            FrcResponseTime::Ms20480 => 20480,
        }
    }

    /// Bits 4..6 of the FRC configuration byte
    pub fn bits(self) -> u8 {
        (self as u8) << 4
    }

    pub fn from_bits(byte: u8) -> Self {
        Self::ALL[((byte & 0x70) >> 4) as usize]
    }

    pub fn from_millis(ms: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|rt| rt.as_millis() == ms)
    }
}

/// FRC timing inputs of one network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrcTimingParams {
    pub bonded_nodes: u16,
    pub rf_mode: RfMode,
    pub response_time: FrcResponseTime,
}

/// FRC data collection mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrcMode {
    /// Up to 2 bytes of user data
    Standard,
    /// More than 2 bytes of user data
    Advanced,
}

/// FRC sweep duration estimate (ms)
pub fn frc_wait_ms(params: &FrcTimingParams, mode: FrcMode) -> u64 {
    let nodes = params.bonded_nodes as u64;
    let rt = params.response_time.as_millis();

    match (mode, params.rf_mode) {
        (FrcMode::Standard, _) => nodes * 130 + rt + 250,
        (FrcMode::Advanced, RfMode::Std) => nodes * 150 + rt + 290,
        (FrcMode::Advanced, RfMode::Lp) => nodes * 200 + rt + 390,
    }
}

// =============================================================================
// Per-network timing
// =============================================================================

/// Timing characteristics of one IQRF network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkTiming {
    pub rf_mode: RfMode,
    pub tr_series: TrSeries,
    pub bonded_nodes: u16,
    pub frc_response_time: FrcResponseTime,
}

impl Default for NetworkTiming {
    fn default() -> Self {
        Self {
            rf_mode: RfMode::Lp,
            tr_series: TrSeries::Unknown,
            bonded_nodes: 0,
            frc_response_time: FrcResponseTime::Ms40,
        }
    }
}

impl NetworkTiming {
    pub fn frc_params(&self) -> FrcTimingParams {
        FrcTimingParams {
            bonded_nodes: self.bonded_nodes,
            rf_mode: self.rf_mode,
            response_time: self.frc_response_time,
        }
    }
}

// =============================================================================
// Wait strategies
// =============================================================================

/// How long to wait for the response of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStrategy {
    /// Base time plus routing time
    Default,
    /// Network-wide FRC sweep
    Frc { params: FrcTimingParams, mode: FrcMode },
}

impl WaitStrategy {
    /// Pick the strategy for a request from its interface tag
    pub fn select(request: &CallRequest, timing: &NetworkTiming) -> Self {
        if request.interface != DeviceInterface::Frc {
            return WaitStrategy::Default;
        }

        match frc_mode(request) {
            Some(mode) => WaitStrategy::Frc { params: timing.frc_params(), mode },
            None => {
                tracing::warn!(
                    "No FRC command in {}, using default response wait",
                    request.method
                );
                WaitStrategy::Default
            }
        }
    }
}

fn frc_mode(request: &CallRequest) -> Option<FrcMode> {
    let user_data_len = match request.method.as_str() {
        "send" => match request.args.first()? {
            Value::FrcCommand(cmd) => cmd.user_data.len(),
            _ => return None,
        },
        "send_selective" => match request.args.first()? {
            Value::FrcSelectiveCommand(cmd) => cmd.user_data.len(),
            _ => return None,
        },
        _ => return None,
    };

    if user_data_len <= 2 {
        Some(FrcMode::Standard)
    } else {
        Some(FrcMode::Advanced)
    }
}

/// Time to wait for the response of the current request.
///
/// `confirmation` is present when the request was confirmed by the
/// addressed node (unicast, not coordinator).
pub fn response_wait(
    base: Duration,
    strategy: &WaitStrategy,
    confirmation: Option<&Confirmation>,
) -> Duration {
    match strategy {
        WaitStrategy::Frc { params, mode } => Duration::from_millis(frc_wait_ms(params, *mode)),
        WaitStrategy::Default => {
            let routing = confirmation
                .map(|c| routing_time_ms(c.hops, c.timeslot_length))
                .unwrap_or(0);
            base + Duration::from_millis(routing + RESPONSE_WAIT_RESERVE_MS)
        }
    }
}

/// Mandatory pause after a broadcast confirmation
pub fn after_confirmation_wait(confirmation: &Confirmation, elapsed: Duration) -> Duration {
    let total = Duration::from_millis(routing_time_ms(
        confirmation.hops,
        confirmation.timeslot_length,
    ));
    total.saturating_sub(elapsed)
}

/// Mandatory pause after a response.
///
/// With a confirmation the pause covers the request routing and the response
/// routing and `elapsed` counts from the confirmation; otherwise it covers one
/// response timeslot counted from the response.
pub fn after_response_wait(
    rf_mode: RfMode,
    tr_series: TrSeries,
    response_len: usize,
    confirmation: Option<&Confirmation>,
    elapsed: Duration,
) -> Duration {
    let response_ts = timeslot_length(rf_mode, tr_series, response_len);

    let total_ms = match confirmation {
        Some(c) => {
            routing_time_ms(c.hops, c.timeslot_length)
                + routing_time_ms(c.hops_response, response_ts)
        }
        None => response_ts as u64 * 10,
    };

    Duration::from_millis(total_ms).saturating_sub(elapsed)
}
