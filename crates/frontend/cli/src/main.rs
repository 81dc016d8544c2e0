use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use vmsvga::registers::*;
use vmsvga::{DeviceConfig, DeviceStatus, VmSvgaDevice};
use vmsvga_core::logging::{LogConfig, LogLevel};
use vmsvga_core::types::Frame;
use vmsvga_core::{ConsoleChar, DisplayConsole, GraphicHwOps, HeadlessConsole, SurfaceInfo};

/// Drive the adapter without a window: boot in VGA text mode, switch to the
/// SVGA path, and capture what the host console would show.
#[derive(Parser)]
struct Args {
    /// Device configuration (JSON); defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Refreshes to run in VGA text mode before enabling SVGA
    #[arg(long, default_value_t = 2)]
    legacy_frames: u32,

    /// Refreshes to run once SVGA is enabled
    #[arg(long, default_value_t = 5)]
    frames: u32,

    #[arg(long, default_value_t = 800)]
    width: u32,

    #[arg(long, default_value_t = 600)]
    height: u32,

    /// Write the last presented frame here as PNG
    #[arg(long)]
    output: Option<PathBuf>,

    /// Write a JSON run report here
    #[arg(long)]
    report: Option<PathBuf>,

    /// Device log level: off, error, warn, info, debug, trace
    #[arg(long, default_value = "warn")]
    log_level: LogLevel,

    /// Send device logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[derive(Serialize)]
struct RunReport {
    config: DeviceConfig,
    legacy_frames: u32,
    frames: u32,
    /// Text cells captured while in VGA text mode
    banner: String,
    surface: Option<SurfaceInfo>,
    surface_replacements: u64,
    updates: u64,
    device: DeviceStatus,
}

fn level_filter(level: LogLevel) -> log::LevelFilter {
    match level {
        LogLevel::Off => log::LevelFilter::Off,
        LogLevel::Error => log::LevelFilter::Error,
        LogLevel::Warn => log::LevelFilter::Warn,
        LogLevel::Info => log::LevelFilter::Info,
        LogLevel::Debug => log::LevelFilter::Debug,
        LogLevel::Trace => log::LevelFilter::Trace,
    }
}

fn write_reg(device: &mut VmSvgaDevice, reg: u32, value: u32) {
    device.io_write(SVGA_INDEX_PORT, reg as u64, 4);
    device.io_write(SVGA_VALUE_PORT, value as u64, 4);
}

fn read_reg(device: &mut VmSvgaDevice, reg: u32) -> u32 {
    device.io_write(SVGA_INDEX_PORT, reg as u64, 4);
    device.io_read(SVGA_VALUE_PORT, 4) as u32
}

/// Put a banner into the VGA text buffer, white on blue
fn write_banner(device: &VmSvgaDevice, text: &str) -> Result<()> {
    let cells: Vec<u8> = text.bytes().flat_map(|ch| [ch, 0x1F]).collect();
    device.vram().write(0, &cells)?;
    Ok(())
}

/// Bring the SVGA path up the way a guest driver would
fn enable_svga(device: &mut VmSvgaDevice, width: u32, height: u32) -> Result<()> {
    write_reg(device, SVGA_REG_ID, SVGA_ID_2);
    let id = read_reg(device, SVGA_REG_ID);
    anyhow::ensure!(id == SVGA_ID_2, "device negotiated {:#x}, wanted SVGA_ID_2", id);

    let (max_width, max_height) = (
        read_reg(device, SVGA_REG_MAX_WIDTH),
        read_reg(device, SVGA_REG_MAX_HEIGHT),
    );
    anyhow::ensure!(
        width <= max_width && height <= max_height,
        "{}x{} exceeds the device maximum of {}x{}",
        width,
        height,
        max_width,
        max_height
    );

    write_reg(device, SVGA_REG_WIDTH, width);
    write_reg(device, SVGA_REG_HEIGHT, height);
    write_reg(device, SVGA_REG_BITS_PER_PIXEL, 32);
    write_reg(device, SVGA_REG_ENABLE, 1);
    write_reg(device, SVGA_REG_CONFIG_DONE, 1);
    Ok(())
}

/// Paint a colour gradient into the linear framebuffer
fn paint_test_pattern(device: &mut VmSvgaDevice) -> Result<()> {
    let width = read_reg(device, SVGA_REG_WIDTH).max(1);
    let height = read_reg(device, SVGA_REG_HEIGHT).max(1);
    let pitch = read_reg(device, SVGA_REG_BYTES_PER_LINE) as usize;

    let mut fb = vec![0u8; pitch * height as usize];
    for (y, row) in fb.chunks_exact_mut(pitch.max(1)).enumerate() {
        for (x, px) in row.chunks_exact_mut(4).enumerate() {
            let r = (x as u32 * 255 / width) as u8;
            let g = (y as u32 * 255 / height) as u8;
            let b = ((x + y) % 256) as u8;
            px.copy_from_slice(&[b, g, r, 0]);
        }
    }
    device
        .vram()
        .write(0, &fb)
        .context("test pattern does not fit in VRAM")?;
    Ok(())
}

fn write_png(path: &Path, frame: &Frame) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), frame.width, frame.height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);

    let data: Vec<u8> = frame
        .pixels
        .iter()
        .flat_map(|&argb| {
            let [b, g, r, a] = argb.to_le_bytes();
            [r, g, b, a]
        })
        .collect();

    let mut writer = encoder.write_header()?;
    writer.write_image_data(&data)?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(level_filter(args.log_level))
        .parse_default_env()
        .init();

    let log_config = LogConfig::global();
    log_config.set_global_level(args.log_level);
    if let Some(path) = &args.log_file {
        log_config
            .set_log_file(path.clone())
            .with_context(|| format!("opening log file {}", path.display()))?;
    }

    let config = match &args.config {
        Some(path) => DeviceConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => DeviceConfig::default(),
    };
    log::info!("device config: {:?}", config);

    let mut device = VmSvgaDevice::realize(&config)?;
    let mut console = HeadlessConsole::new();

    let banner_text = "VMSVGA headless";
    write_banner(&device, banner_text)?;
    let mut cells = vec![0 as ConsoleChar; banner_text.len()];
    for frame in 0..args.legacy_frames {
        device.gfx_update(&mut console);
        device.text_update(&mut cells);
        log::debug!("legacy frame {}: {:?}", frame, console.surface_size());
    }
    let banner: String = cells.iter().map(|&cell| (cell & 0xFF) as u8 as char).collect();

    enable_svga(&mut device, args.width, args.height)?;
    paint_test_pattern(&mut device)?;
    device.invalidate();

    for frame in 0..args.frames {
        device.gfx_update(&mut console);
        log::debug!(
            "frame {}: surface {:?}, scanout {:?}",
            frame,
            console.surface_size(),
            device.scanout_len()
        );
    }

    let (width, height) = console.surface_size();
    println!(
        "Presented {} updates, last surface {}x{} ({} replacements)",
        console.update_count(),
        width,
        height,
        console.replace_count()
    );

    if let Some(path) = &args.output {
        let frame = console
            .frame()
            .context("no frame was presented; nothing to write")?;
        write_png(path, frame)?;
        println!("Wrote {}", path.display());
    }

    if let Some(path) = &args.report {
        let report = RunReport {
            config,
            legacy_frames: args.legacy_frames,
            frames: args.frames,
            banner,
            surface: console.surface(),
            surface_replacements: console.replace_count(),
            updates: console.update_count(),
            device: device.status(),
        };
        let mut file =
            File::create(path).with_context(|| format!("creating {}", path.display()))?;
        write!(file, "{}", serde_json::to_string_pretty(&report)?)?;
        println!("Wrote {}", path.display());
    }

    device.finalize();
    log_config.clear_log_file();
    Ok(())
}
