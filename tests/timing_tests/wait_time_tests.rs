//! Wait Time Tests
//!
//! Tests for timeslot lookup, response waits and mandatory pauses.

use std::time::Duration;

use iqrf_dpa::protocol::{CallRequest, Confirmation, DeviceInterface, FrcCommand, NodeAddress, Value};
use iqrf_dpa::timing::{
    after_confirmation_wait, after_response_wait, frc_wait_ms, response_wait, timeslot_length,
    FrcMode, FrcResponseTime, FrcTimingParams, NetworkTiming, RfMode, TrSeries, WaitStrategy,
};

fn confirmation(hops: u8, timeslot_length: u8, hops_response: u8) -> Confirmation {
    Confirmation { dpa_value: 0, hops, timeslot_length, hops_response }
}

fn frc_params(bonded_nodes: u16, rf_mode: RfMode) -> FrcTimingParams {
    FrcTimingParams { bonded_nodes, rf_mode, response_time: FrcResponseTime::Ms40 }
}

fn frc_send(user_data_len: usize) -> CallRequest {
    CallRequest::new("net", NodeAddress::Coordinator, DeviceInterface::Frc, "send")
        .with_arg(Value::FrcCommand(FrcCommand { id: 0x80, user_data: vec![0; user_data_len] }))
}

// =============================================================================
// Timeslot Tests
// =============================================================================

#[test]
fn test_timeslot_std_tr72x() {
    assert_eq!(timeslot_length(RfMode::Std, TrSeries::Tr72x, 18), 3);
    assert_eq!(timeslot_length(RfMode::Std, TrSeries::Tr72x, 19), 4);
    assert_eq!(timeslot_length(RfMode::Std, TrSeries::Tr72x, 41), 4);
    assert_eq!(timeslot_length(RfMode::Std, TrSeries::Tr72x, 42), 5);
}

#[test]
fn test_timeslot_std_tr52x_and_unknown() {
    for series in [TrSeries::Tr52x, TrSeries::Unknown] {
        assert_eq!(timeslot_length(RfMode::Std, series, 11), 3);
        assert_eq!(timeslot_length(RfMode::Std, series, 12), 4);
        assert_eq!(timeslot_length(RfMode::Std, series, 33), 5);
        assert_eq!(timeslot_length(RfMode::Std, series, 54), 6);
    }
}

#[test]
fn test_timeslot_lp() {
    assert_eq!(timeslot_length(RfMode::Lp, TrSeries::Tr72x, 8), 8);
    assert_eq!(timeslot_length(RfMode::Lp, TrSeries::Tr72x, 9), 9);
    assert_eq!(timeslot_length(RfMode::Lp, TrSeries::Tr72x, 32), 10);

    assert_eq!(timeslot_length(RfMode::Lp, TrSeries::Tr52x, 13), 8);
    assert_eq!(timeslot_length(RfMode::Lp, TrSeries::Tr52x, 14), 9);
    assert_eq!(timeslot_length(RfMode::Lp, TrSeries::Unknown, 36), 10);
}

// =============================================================================
// Response Wait Tests
// =============================================================================

#[test]
fn test_response_wait_with_confirmation() {
    let wait = response_wait(
        Duration::from_millis(2000),
        &WaitStrategy::Default,
        Some(&confirmation(2, 4, 2)),
    );
    assert_eq!(wait, Duration::from_millis(2220));
}

#[test]
fn test_response_wait_without_confirmation() {
    let wait = response_wait(Duration::from_millis(2000), &WaitStrategy::Default, None);
    assert_eq!(wait, Duration::from_millis(2100));
}

#[test]
fn test_frc_wait_standard() {
    let strategy = WaitStrategy::Frc { params: frc_params(10, RfMode::Std), mode: FrcMode::Standard };
    let wait = response_wait(Duration::from_millis(2000), &strategy, None);
    assert_eq!(wait, Duration::from_millis(1590));
}

#[test]
fn test_frc_wait_advanced() {
    assert_eq!(frc_wait_ms(&frc_params(10, RfMode::Std), FrcMode::Advanced), 1830);
    assert_eq!(frc_wait_ms(&frc_params(10, RfMode::Lp), FrcMode::Advanced), 2430);
}

#[test]
fn test_frc_wait_uses_response_time() {
    let params = FrcTimingParams {
        bonded_nodes: 0,
        rf_mode: RfMode::Std,
        response_time: FrcResponseTime::Ms640,
    };
    assert_eq!(frc_wait_ms(&params, FrcMode::Standard), 890);
}

// =============================================================================
// Strategy Selection Tests
// =============================================================================

#[test]
fn test_select_default_for_regular_requests() {
    let request = CallRequest::new("net", NodeAddress::Node(1), DeviceInterface::Os, "read");
    assert_eq!(WaitStrategy::select(&request, &NetworkTiming::default()), WaitStrategy::Default);
}

#[test]
fn test_select_frc_mode_by_user_data() {
    let timing = NetworkTiming { bonded_nodes: 5, rf_mode: RfMode::Std, ..NetworkTiming::default() };

    match WaitStrategy::select(&frc_send(2), &timing) {
        WaitStrategy::Frc { params, mode } => {
            assert_eq!(mode, FrcMode::Standard);
            assert_eq!(params.bonded_nodes, 5);
        }
        other => panic!("Expected FRC strategy, got {:?}", other),
    }

    match WaitStrategy::select(&frc_send(3), &timing) {
        WaitStrategy::Frc { mode, .. } => assert_eq!(mode, FrcMode::Advanced),
        other => panic!("Expected FRC strategy, got {:?}", other),
    }
}

#[test]
fn test_select_falls_back_without_frc_command() {
    let request = CallRequest::new("net", NodeAddress::Coordinator, DeviceInterface::Frc, "send");
    assert_eq!(WaitStrategy::select(&request, &NetworkTiming::default()), WaitStrategy::Default);
}

#[test]
fn test_select_default_for_frc_methods_without_command() {
    let timing = NetworkTiming { bonded_nodes: 0, rf_mode: RfMode::Std, ..NetworkTiming::default() };

    for method in ["extra_result", "set_params"] {
        let request = CallRequest::new("net", NodeAddress::Coordinator, DeviceInterface::Frc, method);
        let strategy = WaitStrategy::select(&request, &timing);
        assert_eq!(strategy, WaitStrategy::Default, "{}", method);
        assert_eq!(
            response_wait(Duration::from_millis(2000), &strategy, None),
            Duration::from_millis(2100)
        );
    }
}

// =============================================================================
// Pause Tests
// =============================================================================

#[test]
fn test_after_confirmation_wait() {
    let conf = confirmation(2, 4, 2);
    assert_eq!(after_confirmation_wait(&conf, Duration::ZERO), Duration::from_millis(120));
    assert_eq!(after_confirmation_wait(&conf, Duration::from_millis(20)), Duration::from_millis(100));
}

#[test]
fn test_after_response_wait_with_confirmation() {
    // request routing (1+1)*4*10 + response routing (1+1)*3*10
    let wait = after_response_wait(
        RfMode::Std,
        TrSeries::Tr72x,
        18,
        Some(&confirmation(1, 4, 1)),
        Duration::from_millis(50),
    );
    assert_eq!(wait, Duration::from_millis(90));
}

#[test]
fn test_after_response_wait_without_confirmation() {
    let wait = after_response_wait(RfMode::Lp, TrSeries::Tr52x, 40, None, Duration::from_millis(30));
    assert_eq!(wait, Duration::from_millis(70));
}

#[test]
fn test_pauses_clamp_at_zero() {
    let conf = confirmation(1, 3, 1);
    assert_eq!(after_confirmation_wait(&conf, Duration::from_secs(5)), Duration::ZERO);
    assert_eq!(
        after_response_wait(RfMode::Std, TrSeries::Tr72x, 10, Some(&conf), Duration::from_secs(5)),
        Duration::ZERO
    );
}
