// Licensed under the Apache-2.0 license

use clap::error::ErrorKind;
use clap::{Parser, Subcommand, ValueEnum};
use clap_num::maybe_hex;
use log::LevelFilter;
use mcu_config::{CrcParams, CRC32_ISO_HDLC, CRC32_MPEG2};
use simple_logger::SimpleLogger;
use std::path::PathBuf;

mod image;
mod layout_args;
mod metadata;

use layout_args::LayoutArgs;

#[derive(Parser)]
#[command(version, about = "Firmware image tooling", long_about = None)]
struct Xtask {
    /// Log every layout and payload decision
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    xtask: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a metadata block and its JSON mirror for a firmware binary
    MetadataGen {
        /// Text file holding the version, e.g. "1.4" or "1.4.2"
        #[arg(value_name = "VERSION_FILE")]
        version_file: PathBuf,

        #[arg(value_name = "FIRMWARE_BIN")]
        firmware: PathBuf,

        /// Four character MCU tag, e.g. F407
        #[arg(value_name = "MCU_ID")]
        mcu_id: String,

        /// Metadata output; the JSON mirror is written next to it
        #[arg(value_name = "OUTPUT_BIN")]
        output: PathBuf,

        /// Build time in Unix seconds instead of the current time
        #[arg(long, env = "SOURCE_DATE_EPOCH", value_parser = maybe_hex::<u32>)]
        timestamp: Option<u32>,

        #[arg(long, value_enum, default_value_t = CrcChoice::Stm32f4)]
        crc: CrcChoice,
    },
    /// Combine secondary bootloader and application into an update image
    Combine {
        #[arg(value_name = "APP_BIN")]
        app: PathBuf,

        #[arg(value_name = "APP_METADATA")]
        app_metadata: PathBuf,

        #[arg(value_name = "SEC_BIN")]
        sec: PathBuf,

        #[arg(value_name = "SEC_METADATA")]
        sec_metadata: PathBuf,

        #[arg(value_name = "OUTPUT")]
        output: PathBuf,

        #[command(flatten)]
        layout: LayoutArgs,
    },
    /// Compose an image from arbitrary region payloads
    Compose {
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,

        /// Region payload as REGION=PATH; repeat for every region
        #[arg(long = "payload", value_name = "REGION=PATH", value_parser = parse_payload)]
        payloads: Vec<(String, PathBuf)>,

        #[command(flatten)]
        layout: LayoutArgs,
    },
    /// Print a resolved flash layout
    Layout {
        #[command(flatten)]
        layout: LayoutArgs,
    },
    /// Decode a metadata block and print it as JSON
    MetadataDump {
        #[arg(value_name = "METADATA_BIN")]
        metadata: PathBuf,
    },
    /// Check a metadata block against its firmware binary
    MetadataVerify {
        #[arg(value_name = "METADATA_BIN")]
        metadata: PathBuf,

        #[arg(value_name = "FIRMWARE_BIN")]
        firmware: PathBuf,

        #[arg(long, value_enum, default_value_t = CrcChoice::Stm32f4)]
        crc: CrcChoice,
    },
    /// Check every metadata region of a composed image
    ImageVerify {
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        #[arg(long, value_enum, default_value_t = CrcChoice::Stm32f4)]
        crc: CrcChoice,

        #[command(flatten)]
        layout: LayoutArgs,
    },
    /// Copy the raw bytes of an ELF section to a file
    ElfSection {
        #[arg(value_name = "ELF")]
        elf: PathBuf,

        #[arg(value_name = "SECTION")]
        section: String,

        #[arg(value_name = "OUTPUT")]
        output: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum CrcChoice {
    /// STM32F4 CRC unit (CRC-32/MPEG-2, word padded)
    Stm32f4,
    /// CRC-32/MPEG-2 over the byte stream
    Mpeg2,
    /// Reflected CRC-32 as used by zlib
    IsoHdlc,
}

impl CrcChoice {
    fn params(self) -> &'static CrcParams {
        match self {
            CrcChoice::Stm32f4 => &mcu_config_stm32f4::HW_CRC,
            CrcChoice::Mpeg2 => &CRC32_MPEG2,
            CrcChoice::IsoHdlc => &CRC32_ISO_HDLC,
        }
    }
}

fn parse_payload(s: &str) -> Result<(String, PathBuf), String> {
    match s.split_once('=') {
        Some((region, path)) if !region.is_empty() && !path.is_empty() => {
            Ok((region.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected REGION=PATH, got {s:?}")),
    }
}

fn main() {
    let cli = match Xtask::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => {
            println!("{}", e.render());
            std::process::exit(1);
        }
    };

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let _ = SimpleLogger::new().with_level(level).init();

    let result = match &cli.xtask {
        Commands::MetadataGen {
            version_file,
            firmware,
            mcu_id,
            output,
            timestamp,
            crc,
        } => metadata::generate(mcu_builder::MetadataArgs {
            version_file,
            firmware,
            mcu_id,
            output,
            crc: crc.params(),
            timestamp: *timestamp,
        }),
        Commands::Combine {
            app,
            app_metadata,
            sec,
            sec_metadata,
            output,
            layout,
        } => image::combine(
            layout,
            &[
                ("boot_sec", sec.as_path()),
                ("boot_sec_metadata", sec_metadata.as_path()),
                ("app", app.as_path()),
                ("app_metadata", app_metadata.as_path()),
            ],
            output,
        ),
        Commands::Compose {
            output,
            payloads,
            layout,
        } => {
            let payloads: Vec<(&str, &std::path::Path)> = payloads
                .iter()
                .map(|(region, path)| (region.as_str(), path.as_path()))
                .collect();
            image::compose(layout, &payloads, output)
        }
        Commands::Layout { layout } => image::show_layout(layout),
        Commands::MetadataDump { metadata } => metadata::dump(metadata),
        Commands::MetadataVerify {
            metadata,
            firmware,
            crc,
        } => metadata::verify(metadata, firmware, crc.params()),
        Commands::ImageVerify { image, crc, layout } => {
            image::verify(layout, image, crc.params())
        }
        Commands::ElfSection {
            elf,
            section,
            output,
        } => image::extract_section(elf, section, output),
    };
    result.unwrap_or_else(|e| {
        eprintln!("ERROR: {:#}", e);
        std::process::exit(1);
    });
}
