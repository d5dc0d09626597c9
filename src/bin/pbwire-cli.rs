//! CLI pbwire
//!
//! Проверка файлов с данными protobuf (потоковый разбор порциями и
//! побайтовая сверка повторной сериализации) и печать varint-кодировок.

use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{bail, Context, Result};
use bytes::BytesMut;
use clap::{Parser, Subcommand};
use pbwire::{
    encode_to_vec, init_logging, merge_from_reader,
    stream::UnknownValue,
    wire::{encode_varint, zigzag_encode64},
    CodecSettings, LogFormat, LoggingConfig, RawMessage,
};
use tracing::{debug, error};

/// Аргументы командной строки.
#[derive(Parser)]
#[command(name = "pbwire-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "pbwire CLI - inspect protocol-buffer wire data", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Файл настроек декодера (toml/json/yaml)
    #[arg(long, env = "PBWIRE_CONFIG", global = true)]
    config: Option<PathBuf>,
    /// Подробный вывод (debug)
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Логи в формате JSON
    #[arg(long, global = true)]
    json_logs: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Разобрать файл как сообщение без схемы
    Scan {
        /// Путь к файлу
        file: PathBuf,
        /// Размер порции чтения в байтах
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Предельная глубина вложенности
        #[arg(long)]
        max_depth: Option<u32>,
    },
    /// Напечатать varint-кодировку числа
    Varint {
        /// Значение
        #[arg(allow_negative_numbers = true)]
        value: i64,
        /// Применить zigzag перед кодированием
        #[arg(long)]
        zigzag: bool,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let settings = CodecSettings::load_from(cli.config.as_deref())
        .context("failed to load codec settings")?;

    let logging = LoggingConfig {
        level: if cli.verbose {
            "debug".to_string()
        } else {
            settings.log_level.clone()
        },
        format: if cli.json_logs {
            LogFormat::Json
        } else {
            LogFormat::Compact
        },
        ..Default::default()
    };
    let _handle = init_logging(logging).map_err(|e| anyhow::anyhow!(e))?;
    debug!(?settings, "codec settings loaded");

    match cli.command {
        Commands::Scan {
            file,
            chunk_size,
            max_depth,
        } => scan(&file, &settings, chunk_size, max_depth).map(ExitCode::from),
        Commands::Varint { value, zigzag } => {
            println!("{}", varint_hex(value, zigzag));
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Потоковый разбор файла и сверка повторной сериализации.
///
/// Отказ декодера не считается ошибкой CLI: печатается отчёт, а результатом
/// становится код завершения по статусу ошибки.
fn scan(
    path: &Path,
    settings: &CodecSettings,
    chunk_size: Option<usize>,
    max_depth: Option<u32>,
) -> Result<u8> {
    let chunk_size = chunk_size.unwrap_or(settings.chunk_size);
    if chunk_size == 0 {
        bail!("chunk size must be positive");
    }
    let mut options = settings.to_parse_options();
    if let Some(depth) = max_depth {
        options = options.with_max_depth(depth);
    }

    let file = fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut msg = RawMessage::new();
    if let Err(e) = merge_from_reader(&mut msg, file, chunk_size, &options) {
        error!(
            code = e.status_code().code(),
            exhaustion = e.is_resource_exhaustion(),
            "scan of {} failed",
            path.display()
        );
        eprintln!("{}: {}", path.display(), e.report());
        return Ok(e.exit_code());
    }

    let (mut varints, mut fixed, mut delimited, mut groups) = (0usize, 0usize, 0usize, 0usize);
    for (_, value) in msg.unknown_fields().iter() {
        match value {
            UnknownValue::Varint(_) => varints += 1,
            UnknownValue::Fixed32(_) | UnknownValue::Fixed64(_) => fixed += 1,
            UnknownValue::LengthDelimited(_) => delimited += 1,
            UnknownValue::Group(_) => groups += 1,
        }
    }

    let original = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let reencoded = encode_to_vec(&msg);

    println!("file:       {}", path.display());
    println!("size:       {} bytes", original.len());
    println!(
        "fields:     {} (varint {varints}, fixed {fixed}, length-delimited {delimited}, group {groups})",
        varints + fixed + delimited + groups
    );
    if reencoded == original {
        println!("re-encode:  byte-exact");
        Ok(0)
    } else {
        bail!(
            "re-encoding differs: {} bytes vs {} bytes original",
            reencoded.len(),
            original.len()
        )
    }
}

fn varint_hex(
    value: i64,
    zigzag: bool,
) -> String {
    let raw = if zigzag {
        zigzag_encode64(value)
    } else {
        value as u64
    };
    let mut buf = BytesMut::new();
    encode_varint(raw, &mut buf);
    buf.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_input(data: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(data).unwrap();
        file
    }

    /// Тест проверяет успешный разбор корректного файла.
    #[test]
    fn test_scan_valid_input() {
        let file = write_input(&[0x08, 0x96, 0x01, 0x12, 0x02, b'h', b'i']);
        let code = scan(file.path(), &CodecSettings::default(), Some(3), None).unwrap();
        assert_eq!(code, 0);
    }

    /// Тест проверяет, что обрезанный вход даёт код EX_DATAERR, а не
    /// ошибку CLI.
    #[test]
    fn test_scan_truncated_input() {
        let file = write_input(&[0x08, 0x96]);
        let code = scan(file.path(), &CodecSettings::default(), Some(1), None).unwrap();
        assert_eq!(code, 65);
    }

    /// Тест проверяет код завершения при превышении глубины вложенности.
    #[test]
    fn test_scan_depth_limit() {
        // Три вложенные группы поля 1
        let file = write_input(&[0x0B, 0x0B, 0x0B, 0x0C, 0x0C, 0x0C]);
        let settings = CodecSettings::default();

        assert_eq!(scan(file.path(), &settings, None, Some(3)).unwrap(), 0);
        assert_eq!(scan(file.path(), &settings, None, Some(2)).unwrap(), 65);
    }

    /// Тест проверяет нулевой размер порции.
    #[test]
    fn test_scan_rejects_zero_chunk_size() {
        let file = write_input(&[0x08, 0x01]);
        assert!(scan(file.path(), &CodecSettings::default(), Some(0), None).is_err());
    }

    /// Тест проверяет hex-вывод varint.
    #[test]
    fn test_varint_hex() {
        assert_eq!(varint_hex(300, false), "ac 02");
        assert_eq!(varint_hex(-1, true), "01");
    }
}
