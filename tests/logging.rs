use dmpatch::host::PrintkLogger;

struct Discard;

impl log::Log for Discard {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, _record: &log::Record) {}

    fn flush(&self) {}
}

static DISCARD: Discard = Discard;

#[test]
fn test_install_keeps_existing_logger_level() {
    log::set_logger(&DISCARD).unwrap();
    log::set_max_level(log::LevelFilter::Trace);

    unsafe { PrintkLogger::install(0) };
    assert_eq!(log::max_level(), log::LevelFilter::Trace);
    assert!(log::logger().enabled(&log::Metadata::builder().build()));
}
