use msp430_jtag::error::ImageErrorKind;
use msp430_jtag::port::sim::{NoDelay, SimConfig, SimTarget};
use msp430_jtag::{
    EraseMode, Error, ProgramConfig, Programmer, Region, ReleaseTarget, Resolution, Status,
};

const BLINK: &str = "\
@C000
31 40 00 03 B2 40 80 5A 20 01 D2 D3 22 00 D2 E3
21 00 3F 40 00 80 1F 83 FE 23 F9 3F
@FFFE
00 C0
q
";

fn device(id: u16) -> SimTarget {
    SimTarget::new(SimConfig {
        device_id: id,
        ..SimConfig::default()
    })
}

#[test]
fn full_run_on_fast_flash_device() {
    let mut target = device(0x2553);
    let report = Programmer::new(ProgramConfig::default())
        .program_text(&mut target, NoDelay, BLINK)
        .unwrap();

    assert!(report.device.is_known());
    assert_eq!(report.device.id(), 0x2553);
    assert_eq!(report.sections, 2);
    assert_eq!(report.words, 15);

    assert_eq!(target.peek(0xC000), 0x4031);
    assert_eq!(target.peek(0xC01A), 0x3FF9);
    assert_eq!(target.peek(0xFFFE), 0xC000);

    // Mass erase, then the two protected segments
    let erases: Vec<(u16, u16, u32)> = target
        .erases()
        .iter()
        .map(|e| (e.fctl1, e.address, e.strobes))
        .collect();
    assert_eq!(
        erases,
        [
            (EraseMode::Mass.fctl1(), 0xFE00, 10600),
            (EraseMode::Segment.fctl1(), 0xFE00, 4820),
            (EraseMode::Segment.fctl1(), 0x1000, 4820),
        ]
    );
    // Two erase checks, then one verify per section
    assert_eq!(target.psa_runs(), [0xFE00, 0x1000, 0xC000, 0xFFFE]);
    assert_eq!(target.programmed().len(), 15);

    // RAM self-test pattern left behind
    assert_eq!(target.peek(0x0200), 0x1234);

    assert!(target.cpu_released());
    assert_eq!(target.pc(), 0xC000);
    assert!(target.flash_locked());
    assert!(target.info_a_locked());
    assert_eq!(target.violations(), 0);
    assert_eq!(target.entries(), 1);
}

#[test]
fn full_run_on_older_flash_device() {
    let mut target = device(0xF149);
    let report = Programmer::new(ProgramConfig::default())
        .program_text(&mut target, NoDelay, BLINK)
        .unwrap();
    assert_eq!(report.words, 15);

    let mass = target
        .erases()
        .iter()
        .filter(|e| e.fctl1 == EraseMode::Mass.fctl1())
        .count();
    assert_eq!(mass, 19);
    assert_eq!(target.peek(0xFFFE), 0xC000);
    assert_eq!(target.violations(), 0);
}

#[test]
fn ram_test_uses_device_ram() {
    let mut target = device(0xF46F);
    Programmer::new(ProgramConfig::default())
        .program_text(&mut target, NoDelay, "@3100\n00 00\nq\n")
        .unwrap();
    assert_eq!(target.peek(0x1100), 0x1234);
    assert_eq!(target.peek(0x0200), 0x0000);
}

#[test]
fn ram_test_failure_stops_before_erase() {
    let mut target = device(0xF149);
    let config = ProgramConfig::default().with_ram_test_addr(0xC000);
    let result = Programmer::new(config).program_text(&mut target, NoDelay, BLINK);

    assert_eq!(
        result,
        Err(Error::RamSelfTest {
            expected: 0x1234,
            found: 0xFFFF
        })
    );
    assert!(target.erases().is_empty());
    assert!(!target.cpu_released());
}

#[test]
fn generic_device_is_programmed_conservatively() {
    let mut target = device(0x1234);
    let report = Programmer::new(ProgramConfig::default())
        .program_text(&mut target, NoDelay, BLINK)
        .unwrap();

    assert_eq!(report.device, Resolution::Generic { id: 0x1234 });
    assert_eq!(report.to_string(), "unknown device 0x1234 (generic): 2 sections, 15 words");
    // No fast flash: full multi-pass erase
    let mass = target
        .erases()
        .iter()
        .filter(|e| e.fctl1 == EraseMode::Mass.fctl1())
        .count();
    assert_eq!(mass, 19);
    assert_eq!(target.peek(0xFFFE), 0xC000);
}

#[test]
fn verify_failure_aborts_without_release() {
    let mut target = device(0x2553);
    target.stick_bits(0xC004, 0x0001);
    let result = Programmer::new(ProgramConfig::default()).program_text(&mut target, NoDelay, BLINK);

    assert_eq!(
        result,
        Err(Error::SectionWriteFailure {
            section: 0,
            address: 0xC000
        })
    );
    assert!(!bool::from(Status::from(&result)));
    // The reset vector section was never attempted
    assert_eq!(target.peek(0xFFFE), 0xFFFF);
    assert!(!target.cpu_released());
    assert_eq!(target.releases(), 1);
}

#[test]
fn connection_failure_touches_nothing() {
    let mut target = SimTarget::new(SimConfig {
        failed_entries: u32::MAX,
        ..SimConfig::default()
    });
    let result = Programmer::new(ProgramConfig::default()).program_text(&mut target, NoDelay, BLINK);
    assert!(matches!(result, Err(Error::ConnectionTimeout { attempts: 8, .. })));
    assert_eq!(target.entries(), 8);
    assert!(target.erases().is_empty());
}

#[test]
fn blown_fuse_reported_as_such() {
    let mut target = SimTarget::new(SimConfig {
        fuse_blown: true,
        ..SimConfig::default()
    });
    let result = Programmer::new(ProgramConfig::default()).program_text(&mut target, NoDelay, BLINK);
    assert_eq!(Status::from(&result), Status::FuseBlown);
}

#[test]
fn bad_image_is_rejected_before_connecting() {
    let mut target = device(0xF149);
    let result =
        Programmer::new(ProgramConfig::default()).program_text(&mut target, NoDelay, "@C000\n12 XY\n");
    assert_eq!(
        result,
        Err(Error::Image {
            line: 2,
            kind: ImageErrorKind::BadByte
        })
    );
    assert_eq!(target.entries(), 0);
}

#[test]
fn info_a_image_needs_unlock() {
    let image = "@10C0\n34 12\nq\n";

    let mut target = device(0x2553);
    let locked = Programmer::new(ProgramConfig::default()).program_text(&mut target, NoDelay, image);
    assert!(matches!(locked, Err(Error::SectionWriteFailure { section: 0, .. })));

    let mut target = device(0x2553);
    let config = ProgramConfig::default().with_unlock_info_a(true);
    let report = Programmer::new(config).program_text(&mut target, NoDelay, image).unwrap();
    assert_eq!(report.words, 1);
    assert_eq!(target.peek(0x10C0), 0x1234);
    assert!(target.info_a_locked());
}

#[test]
fn custom_protected_regions_and_release_address() {
    let mut target = device(0x2553);
    let config = ProgramConfig::default()
        .with_protected(vec![Region::new(0xC200, 0x100)])
        .with_release(ReleaseTarget::Pc(0xC000));
    Programmer::new(config).program_text(&mut target, NoDelay, BLINK).unwrap();

    assert_eq!(target.erases().len(), 2);
    assert_eq!(target.erases()[1].address, 0xC200);
    assert_eq!(target.psa_runs()[0], 0xC200);
    assert_eq!(target.pc(), 0xC000);
    assert!(target.cpu_released());
}

#[test]
fn odd_ram_test_address_is_aligned() {
    let mut target = device(0xF149);
    let config = ProgramConfig::default().with_ram_test_addr(0x0301);
    Programmer::new(config).program_text(&mut target, NoDelay, BLINK).unwrap();
    assert_eq!(target.peek(0x0300), 0x1234);
}

#[test]
fn ram_test_at_top_of_memory_fails_cleanly() {
    let mut target = device(0xF149);
    let config = ProgramConfig::default().with_ram_test_addr(0xFFFF);
    let result = Programmer::new(config).program_text(&mut target, NoDelay, BLINK);
    assert_eq!(
        result,
        Err(Error::RamSelfTest {
            expected: 0x1234,
            found: 0xFFFF
        })
    );
    assert!(target.erases().is_empty());
}
