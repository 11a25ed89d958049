use msp430_jtag::port::sim::{NoDelay, SimConfig, SimTarget};
use msp430_jtag::session::WDTCTL;
use msp430_jtag::{Error, Format, Jtag, JtagConfig, ReleaseTarget, Resolution, Session, Status};

fn connect(sim: &mut SimTarget) -> msp430_jtag::Result<Session<&mut SimTarget, NoDelay>> {
    Session::connect(Jtag::new(sim, NoDelay, &JtagConfig::default()))
}

fn sim(config: SimConfig) -> SimTarget {
    SimTarget::new(config)
}

#[test]
fn gives_up_after_eight_entry_attempts() {
    let mut target = sim(SimConfig {
        failed_entries: u32::MAX,
        ..SimConfig::default()
    });
    let err = connect(&mut target).err();
    assert_eq!(
        err,
        Some(Error::ConnectionTimeout {
            attempts: 8,
            last_id: 0xFF
        })
    );
    assert_eq!(target.entries(), 8);
}

#[test]
fn retries_entry_until_contact() {
    let mut target = sim(SimConfig {
        failed_entries: 3,
        ..SimConfig::default()
    });
    let session = connect(&mut target).unwrap();
    session.abort();
    assert_eq!(target.entries(), 4);
}

#[test]
fn wrong_jtag_id_is_never_accepted() {
    let mut target = sim(SimConfig {
        jtag_id: 0x91,
        ..SimConfig::default()
    });
    let err = connect(&mut target).err();
    assert_eq!(
        err,
        Some(Error::ConnectionTimeout {
            attempts: 8,
            last_id: 0x91
        })
    );
}

#[test]
fn blown_fuse_is_terminal() {
    let mut target = sim(SimConfig {
        fuse_blown: true,
        ..SimConfig::default()
    });
    let result = connect(&mut target).map(|_| ());
    assert_eq!(result, Err(Error::FuseBlown));
    assert_eq!(Status::from(&result), Status::FuseBlown);
    assert_eq!(target.entries(), 1);
}

#[test]
fn cpu_that_never_syncs_times_out() {
    let mut target = sim(SimConfig {
        sync_delay: None,
        ..SimConfig::default()
    });
    let err = connect(&mut target).err();
    assert_eq!(err, Some(Error::SyncTimeout { polls: 50 }));
}

#[test]
fn slow_sync_within_poll_budget() {
    let mut target = sim(SimConfig {
        sync_delay: Some(49),
        ..SimConfig::default()
    });
    assert!(connect(&mut target).is_ok());

    let mut target = sim(SimConfig {
        sync_delay: Some(50),
        ..SimConfig::default()
    });
    assert!(connect(&mut target).is_err());
}

#[test]
fn connect_identifies_device_and_holds_watchdog() {
    let mut target = sim(SimConfig::default());
    let session = connect(&mut target).unwrap();
    assert!(session.device().is_known());
    assert_eq!(session.descriptor().id, 0xF149);
    assert_eq!(session.descriptor().name, "MSP430F13x/F14x");
    session.abort();

    assert!(target.watchdog_held());
    assert_eq!(target.resets(), 1);
}

#[test]
fn unknown_device_falls_back_to_generic() {
    let mut target = sim(SimConfig {
        device_id: 0x1234,
        ..SimConfig::default()
    });
    let session = connect(&mut target).unwrap();
    assert_eq!(session.device(), Resolution::Generic { id: 0x1234 });
    assert_eq!(session.descriptor().name, "generic");
    session.abort();
}

#[test]
fn byte_and_word_access() {
    let mut target = sim(SimConfig::default());
    let mut session = connect(&mut target).unwrap();

    session.write_mem(Format::Word, 0x0210, 0xBEEF).unwrap();
    assert_eq!(session.read_mem(Format::Word, 0x0210), Ok(0xBEEF));
    assert_eq!(session.read_mem(Format::Byte, 0x0210), Ok(0x00EF));
    assert_eq!(session.read_mem(Format::Byte, 0x0211), Ok(0x00BE));

    session.write_mem(Format::Byte, 0x0211, 0x12).unwrap();
    assert_eq!(session.read_mem(Format::Word, 0x0210), Ok(0x12EF));

    // The watchdog reads back with its own password
    assert_eq!(session.read_mem(Format::Word, WDTCTL), Ok(0x6980));
    session.abort();
}

#[test]
fn quick_access_round_trip() {
    let mut target = sim(SimConfig::default());
    let mut session = connect(&mut target).unwrap();

    let data = [0x1111, 0x2222, 0x3333, 0x4444, 0x5555];
    session.write_mem_quick(0x0300, &data).unwrap();

    let mut quick = [0u16; 5];
    session.read_mem_quick(0x0300, &mut quick).unwrap();
    assert_eq!(quick, data);
    // Nothing past the block was touched
    assert_eq!(session.read_mem(Format::Word, 0x030A), Ok(0x0000));
    assert_eq!(session.read_mem(Format::Word, 0x02FE), Ok(0x0000));
    session.abort();

    assert_eq!(target.peek(0x0304), 0x3333);
}

#[test]
fn block_read_with_and_without_quick_access() {
    for id in [0xF149, 0x1234] {
        let mut target = sim(SimConfig {
            device_id: id,
            ..SimConfig::default()
        });
        target.load(0x0240, &[0xA1A1, 0xB2B2, 0xC3C3]);

        let mut session = connect(&mut target).unwrap();
        let mut buf = [0u16; 3];
        session.read_mem_block(0x0240, &mut buf).unwrap();
        assert_eq!(buf, [0xA1A1, 0xB2B2, 0xC3C3], "device 0x{:04X}", id);
        session.abort();
    }
}

#[test]
fn release_with_reset_restarts_from_vector() {
    let mut target = sim(SimConfig::default());
    target.poke(0xFFFE, 0xC000);

    let session = connect(&mut target).unwrap();
    session.release(ReleaseTarget::from(0xFFFE));

    assert_eq!(target.pc(), 0xC000);
    assert!(target.cpu_released());
    assert!(!target.watchdog_held());
    assert_eq!(target.resets(), 2);
}

#[test]
fn release_to_address_sets_pc() {
    let mut target = sim(SimConfig::default());
    let session = connect(&mut target).unwrap();
    session.release(ReleaseTarget::Pc(0xE000));

    assert_eq!(target.pc(), 0xE000);
    assert!(target.cpu_released());
    assert_eq!(target.resets(), 1);
}

#[test]
fn abort_leaves_cpu_under_jtag() {
    let mut target = sim(SimConfig::default());
    let session = connect(&mut target).unwrap();
    session.abort();

    assert!(!target.cpu_released());
    assert_eq!(target.releases(), 1);
}

#[test]
fn jtag_version_checked_after_reset() {
    let mut target = sim(SimConfig {
        jtag_id_after_por: 0x91,
        ..SimConfig::default()
    });
    let err = connect(&mut target).err();
    assert_eq!(
        err,
        Some(Error::IdMismatch {
            expected: 0x89,
            found: 0x91
        })
    );
    assert_eq!(target.entries(), 1);
}

#[test]
fn cpu_that_never_fetches_times_out() {
    let mut target = sim(SimConfig {
        fetch_delay: None,
        ..SimConfig::default()
    });
    let err = connect(&mut target).err();
    assert_eq!(err, Some(Error::InstrFetchTimeout));
    assert_eq!(target.stalled_polls(), 50);
}

#[test]
fn slow_fetch_within_poll_budget() {
    let mut target = sim(SimConfig {
        fetch_delay: Some(49),
        ..SimConfig::default()
    });
    assert!(connect(&mut target).is_ok());

    let mut target = sim(SimConfig {
        fetch_delay: Some(50),
        ..SimConfig::default()
    });
    assert_eq!(connect(&mut target).err(), Some(Error::InstrFetchTimeout));
}

#[test]
fn halt_gives_up_after_fifty_polls() {
    let mut target = sim(SimConfig::default());
    let mut session = connect(&mut target).unwrap();
    session.jtag_mut().port_mut().hang_after_fetches(0);
    assert_eq!(session.halt_cpu(), Err(Error::InstrFetchTimeout));
    session.abort();

    assert_eq!(target.stalled_polls(), 50);
}
