use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};

pub fn init() {
    init_with_level(LevelFilter::Info)
}

pub fn init_with_level(level: LevelFilter) {
    if let Err(e) = TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    ) {
        eprintln!("logger is already initialized: {e}");
    }
}
