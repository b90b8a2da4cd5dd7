//! Mapping Tests
//!
//! Tests for the standard peripheral descriptor tables.

use iqrf_dpa::protocol::{
    pnum, ArgConverter, DeviceInterface, PcmdSpec, ProtocolMapping, ResultConverter,
};

// =============================================================================
// Table Coverage Tests
// =============================================================================

#[test]
fn test_every_interface_is_mapped() {
    let mapping = ProtocolMapping::standard();
    for interface in DeviceInterface::ALL {
        let entry = mapping.interface(interface);
        assert!(entry.is_some(), "{} has no mapping", interface);
        assert!(!entry.unwrap().methods.is_empty());
    }
}

#[test]
fn test_peripheral_numbers() {
    let mapping = ProtocolMapping::standard();
    let expected = [
        (DeviceInterface::Coordinator, pnum::COORDINATOR),
        (DeviceInterface::Node, pnum::NODE),
        (DeviceInterface::Os, pnum::OS),
        (DeviceInterface::Eeprom, pnum::EEPROM),
        (DeviceInterface::Eeeprom, pnum::EEEPROM),
        (DeviceInterface::Ram, pnum::RAM),
        (DeviceInterface::Ledr, pnum::LEDR),
        (DeviceInterface::Ledg, pnum::LEDG),
        (DeviceInterface::Spi, pnum::SPI),
        (DeviceInterface::Io, pnum::IO),
        (DeviceInterface::Thermometer, pnum::THERMOMETER),
        (DeviceInterface::Pwm, pnum::PWM),
        (DeviceInterface::Uart, pnum::UART),
        (DeviceInterface::Frc, pnum::FRC),
    ];

    for (interface, pnum) in expected {
        assert_eq!(mapping.interface(interface).unwrap().pnum, Some(pnum), "{}", interface);
    }
    assert_eq!(mapping.interface(DeviceInterface::PeripheralInfo).unwrap().pnum, None);
}

#[test]
fn test_method_names_unique_per_interface() {
    for iface in ProtocolMapping::standard().interfaces() {
        let mut names: Vec<_> = iface.methods.iter().map(|m| m.name).collect();
        names.sort_unstable();
        let before = names.len();
        names.dedup();
        assert_eq!(before, names.len(), "duplicate method in {}", iface.interface);
    }
}

#[test]
fn test_fixed_pcmds_unique_per_interface() {
    for iface in ProtocolMapping::standard().interfaces() {
        let mut pcmds: Vec<u8> = iface
            .methods
            .iter()
            .filter_map(|m| match m.pcmd {
                PcmdSpec::Fixed(pcmd) => Some(pcmd),
                PcmdSpec::FromArg(_) => None,
            })
            .collect();
        let before = pcmds.len();
        pcmds.sort_unstable();
        pcmds.dedup();
        // per_info and enumeration share 0x3F but differ in PNUM
        if iface.interface != DeviceInterface::PeripheralInfo {
            assert_eq!(before, pcmds.len(), "duplicate PCMD in {}", iface.interface);
        }
    }
}

// =============================================================================
// Lookup Tests
// =============================================================================

#[test]
fn test_method_lookup() {
    let mapping = ProtocolMapping::standard();

    let read = mapping.method(DeviceInterface::Eeprom, "read").unwrap();
    assert_eq!(read.pcmd, PcmdSpec::Fixed(0x00));
    assert_eq!(read.args.len(), 2);
    assert_eq!(read.args[0].offset, 6);
    assert_eq!(read.args[1].offset, 7);
    assert_eq!(read.result, ResultConverter::Bytes);

    let run_discovery = mapping.method(DeviceInterface::Coordinator, "run_discovery").unwrap();
    assert_eq!(run_discovery.pcmd, PcmdSpec::Fixed(0x07));
    assert_eq!(run_discovery.args[0].converter, ArgConverter::DiscoveryParams);

    assert!(mapping.method(DeviceInterface::Thermometer, "set").is_none());
}

#[test]
fn test_resolve_response_by_pnum_and_pcmd() {
    let mapping = ProtocolMapping::standard();

    let (iface, method) = mapping.resolve_response(pnum::FRC, 0x80).unwrap();
    assert_eq!(iface, DeviceInterface::Frc);
    assert_eq!(method.name, "send");

    let (iface, method) = mapping.resolve_response(pnum::RAM, 0x81).unwrap();
    assert_eq!(iface, DeviceInterface::Ram);
    assert_eq!(method.name, "write");

    let (iface, method) = mapping.resolve_response(pnum::OS, 0x88).unwrap();
    assert_eq!(iface, DeviceInterface::Os);
    assert_eq!(method.name, "restart");
}

#[test]
fn test_resolve_response_requires_response_flag() {
    let mapping = ProtocolMapping::standard();
    assert!(mapping.resolve_response(pnum::OS, 0x00).is_none());
    assert!(mapping.resolve_request(pnum::OS, 0x00).is_some());
}

#[test]
fn test_resolve_unknown() {
    let mapping = ProtocolMapping::standard();
    assert!(mapping.resolve_response(0x40, 0x80).is_none());
    assert!(mapping.resolve_response(pnum::THERMOMETER, 0x85).is_none());
}

#[test]
fn test_exploration_takes_precedence() {
    let mapping = ProtocolMapping::standard();

    // PCMD 0xBF on a regular peripheral is per_info, not the peripheral's method
    let (iface, method) = mapping.resolve_response(pnum::COORDINATOR, 0xBF).unwrap();
    assert_eq!(iface, DeviceInterface::PeripheralInfo);
    assert_eq!(method.name, "per_info");

    let (iface, method) = mapping.resolve_request(0xFF, 0x3F).unwrap();
    assert_eq!(iface, DeviceInterface::PeripheralInfo);
    assert_eq!(method.name, "enumeration");

    let (_, method) = mapping.resolve_request(0xFF, 0x25).unwrap();
    assert_eq!(method.name, "more_per_info");
}
