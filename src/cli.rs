use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use image::RgbaImage;
use std::path::{Path, PathBuf};

use crate::backend::PassBackend;
use crate::cpu::CpuBackend;
use crate::gpu::WgpuBackend;
use crate::pass::{FrameOutcome, NtscPass};
use crate::settings::{NtscSettings, ParamKind};
use crate::surface::FrameContext;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    Gpu,
    Cpu,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply the NTSC pass to an image
    Apply {
        /// Input image
        #[arg(long)]
        input: PathBuf,

        /// Output image, or output directory when rendering several frames
        #[arg(long)]
        out: PathBuf,

        /// Settings JSON file
        #[arg(long)]
        settings: Option<PathBuf>,

        /// Override a parameter, e.g. --set sharpness=0.5
        #[arg(long = "set", value_name = "KEY=VALUE")]
        overrides: Vec<String>,

        /// Force the effect on regardless of the settings file
        #[arg(long)]
        enable: bool,

        /// Number of frames to render (time advances by 1/fps per frame)
        #[arg(long, default_value_t = 1)]
        frames: u32,

        /// Frames per second
        #[arg(long, default_value_t = 60.0)]
        fps: f32,

        #[arg(long, value_enum, default_value_t = BackendKind::Gpu)]
        backend: BackendKind,

        /// WGSL file to use instead of the built-in shader (GPU backend only)
        #[arg(long)]
        shader: Option<PathBuf>,
    },
    /// List the effect parameters
    Params,
    /// Print the default settings as JSON
    Defaults,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Apply { input, out, settings, overrides, enable, frames, fps, backend, shader } => {
            let mut ntsc = match settings {
                Some(path) => NtscSettings::load(&path)?,
                None => NtscSettings::default(),
            };
            for item in &overrides {
                let (key, value) = item
                    .split_once('=')
                    .ok_or_else(|| anyhow!("Expected KEY=VALUE, got '{}'", item))?;
                ntsc.set(key.trim(), value)?;
            }
            if enable {
                ntsc.set_enabled(true);
            }
            if !ntsc.is_active() {
                log::info!("NTSC effect is disabled; output will equal the input");
            }

            let image = image::open(&input)
                .with_context(|| format!("Failed to open {:?}", input))?
                .to_rgba8();

            let job = ApplyJob { image, settings: ntsc, out, frames: frames.max(1), fps };
            match backend {
                BackendKind::Gpu => {
                    let mut gpu = pollster::block_on(WgpuBackend::headless(wgpu::TextureFormat::Rgba8Unorm))?;
                    if let Some(path) = shader {
                        gpu = gpu.with_shader_file(path);
                    }
                    job.run(&mut gpu)?;
                }
                BackendKind::Cpu => {
                    if shader.is_some() {
                        log::warn!("--shader is ignored by the CPU backend");
                    }
                    let mut cpu = CpuBackend::new(RgbaImage::new(1, 1));
                    job.run(&mut cpu)?;
                }
            }
        }
        Commands::Params => print_params(),
        Commands::Defaults => println!("{}", NtscSettings::default().to_json()?),
    }
    Ok(())
}

/// Backends the CLI can load images into and read them back from.
trait ImageTarget {
    fn load_image(&mut self, image: &RgbaImage) -> Result<()>;
    fn read_image(&mut self) -> Result<RgbaImage>;
}

impl ImageTarget for CpuBackend {
    /// Starts a new frame, so the previous frame's event log is dropped.
    fn load_image(&mut self, image: &RgbaImage) -> Result<()> {
        self.clear_events();
        self.set_target(image.clone());
        Ok(())
    }

    fn read_image(&mut self) -> Result<RgbaImage> {
        Ok(self.target().clone())
    }
}

impl ImageTarget for WgpuBackend {
    fn load_image(&mut self, image: &RgbaImage) -> Result<()> {
        self.upload_target(image)
    }

    fn read_image(&mut self) -> Result<RgbaImage> {
        self.read_target()
    }
}

struct ApplyJob {
    image: RgbaImage,
    settings: NtscSettings,
    out: PathBuf,
    frames: u32,
    fps: f32,
}

impl ApplyJob {
    fn frame_path(&self, index: u32) -> PathBuf {
        if self.frames == 1 {
            self.out.clone()
        } else {
            self.out.join(format!("frame_{:05}.png", index))
        }
    }

    fn run<B: PassBackend + ImageTarget>(&self, backend: &mut B) -> Result<()> {
        if self.frames > 1 {
            std::fs::create_dir_all(&self.out)?;
        }

        let descriptor = crate::surface::FrameDescriptor::new(
            self.image.width(),
            self.image.height(),
            wgpu::TextureFormat::Rgba8Unorm,
        );
        let dt = 1.0 / self.fps.max(f32::EPSILON);
        let mut pass = NtscPass::new();
        let mut processed = 0;

        for i in 0..self.frames {
            backend.load_image(&self.image)?;
            let frame = FrameContext::new(descriptor, i as f32 * dt);
            if pass.execute(backend, &self.settings, &frame) == FrameOutcome::Processed {
                processed += 1;
            }

            let path = self.frame_path(i);
            save(&backend.read_image()?, &path)?;
        }

        println!(
            "Wrote {} frame(s) to {:?} ({} processed)",
            self.frames, self.out, processed
        );
        Ok(())
    }
}

fn save(image: &RgbaImage, path: &Path) -> Result<()> {
    image
        .save(path)
        .with_context(|| format!("Failed to write {:?}", path))
}

fn print_params() {
    for def in NtscSettings::param_defs() {
        let kind = match def.kind {
            ParamKind::Bool { default } => format!("bool, default {}", default),
            ParamKind::Float { default, min, max } => {
                format!("float [{}, {}], default {}", min, max, default)
            }
            ParamKind::Int { default, min, max } => {
                format!("int [{}, {}], default {}", min, max, default)
            }
        };
        println!("{} ({})", def.key, kind);
        println!("    {}", def.description);
    }
}
