use env_logger::{Builder, Env};
use log::LevelFilter;
use std::io::Write;

const DEFAULT_FILTER: &str = "warn,hebtts=info";

pub fn init_logger() {
    init_logger_with(None);
}

/// `verbose` forces debug output for the crate regardless of RUST_LOG.
pub fn init_logger_with(verbose: Option<bool>) {
    // Установка базового фильтра и переопределение через переменные окружения
    let env = Env::default().filter_or("RUST_LOG", DEFAULT_FILTER);

    let mut builder = Builder::from_env(env);

    // Явно подавляем логи от определенных модулей
    builder
        .filter_module("mio", LevelFilter::Error)
        .filter_module("tokio_util", LevelFilter::Error)
        .filter_module("hyper", LevelFilter::Error)
        .filter_module("hyper_util", LevelFilter::Error)
        .filter_module("rustls", LevelFilter::Warn)
        .filter_module("reqwest", LevelFilter::Warn);

    if verbose == Some(true) {
        builder
            .filter_module("hebtts", LevelFilter::Debug)
            .filter_module("reqwest", LevelFilter::Debug);
    }

    builder
        // Форматирование логов
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr);

    // Повторная инициализация (например, в тестах) не должна паниковать
    if builder.try_init().is_err() {
        log::debug!("Logger already initialized");
    }
}
