use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueHint};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(long_about = r"
Palette quantizer. Stores an image as a color palette plus an index map in a
compressed container, and reconstructs images from such containers.
")]
struct Opts {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Quantize an image and save it as a palette container
    Compress {
        /// The image to process
        #[clap(name = "FILE", value_hint = ValueHint::FilePath)]
        image_path: PathBuf,
        /// The output container
        #[clap(
            short = 'o',
            default_value = "compressed_palette.qpal",
            value_hint = ValueHint::FilePath
        )]
        output_path: PathBuf,
        /// The quantization step size. Smaller values preserve more color
        /// detail; `1` is lossless.
        #[clap(short = 't', default_value = "10")]
        tolerance: u32,
        /// The zstd compression level
        #[clap(short = 'l', default_value = "3", allow_hyphen_values = true)]
        level: i32,
        /// Store RGBA even if the input has no alpha channel
        #[clap(long)]
        alpha: bool,
    },
    /// Reconstruct an image from a palette container
    Reconstruct {
        /// The container to read
        #[clap(name = "FILE", value_hint = ValueHint::FilePath)]
        container_path: PathBuf,
        /// The output image. The format is chosen by the file extension
        /// (PNG if unknown).
        #[clap(
            short = 'o',
            default_value = "reconstructed.png",
            value_hint = ValueHint::FilePath
        )]
        output_path: PathBuf,
    },
    /// Print the header of a palette container
    Info {
        /// The container to read
        #[clap(name = "FILE", value_hint = ValueHint::FilePath)]
        container_path: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("palquant=info"))
        .init();

    let opts = Opts::parse();
    log::debug!("opts = {:#?}", opts);

    match opts.command {
        Command::Compress {
            image_path,
            output_path,
            tolerance,
            level,
            alpha,
        } => {
            let mut copts = palquant::DEFAULT_COMPRESS_OPTS;
            copts.quantize.tolerance = tolerance;
            copts.write.level = level;
            copts.force_alpha = alpha;
            log::debug!("copts = {copts:?}");

            let pimg = palquant::compress(&image_path, &output_path, &copts).with_context(|| {
                format!(
                    "Failed to compress '{}' into '{}'",
                    image_path.display(),
                    output_path.display()
                )
            })?;

            let [h, w] = pimg.image_dim();
            log::info!(
                "saved palette ({} colors) + index map ({}×{}) → '{}'",
                pimg.palette_len(),
                h,
                w,
                output_path.display()
            );
        }
        Command::Reconstruct {
            container_path,
            output_path,
        } => {
            let img = palquant::reconstruct(&container_path, &output_path).with_context(|| {
                format!(
                    "Failed to reconstruct an image from '{}'",
                    container_path.display()
                )
            })?;

            log::debug!("img.dim = {:?}", img.dim());
            log::info!("reconstructed image saved → '{}'", output_path.display());
        }
        Command::Info { container_path } => {
            let info = palquant::read_container_info(&container_path).with_context(|| {
                format!(
                    "Failed to read a container header from '{}'",
                    container_path.display()
                )
            })?;

            let [h, w] = info.image_dim;
            println!("size:        {}×{}", h, w);
            println!("channels:    {}", info.num_channels);
            println!("palette:     {} colors", info.palette_len);
            println!("index width: {} bytes", info.index_width);
        }
    }

    Ok(())
}
