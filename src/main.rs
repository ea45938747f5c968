use photo_mosaic::grid::DrawError;
use photo_mosaic::loader::{FileFetcher, ImageLoader};
use photo_mosaic::mosaic::{Applied, Mosaic, MosaicError};

use clap::error::ErrorKind;
use clap::{ArgAction, CommandFactory, Parser};

use futures::executor::block_on;

use image::ImageError;

use tracing_subscriber::EnvFilter;

use std::error::Error;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::exit;
use std::rc::Rc;
use std::time::Instant;

/// Error type for this app.
#[derive(Debug)]
enum AppError {
    ArgError(clap::Error),
    RuntimeError(Box<dyn Error>),
}

impl AppError {
    /// Create an error for an invalid argument.
    fn invalid_value(msg: &str) -> Self {
        Self::ArgError(Args::command().error(ErrorKind::InvalidValue, msg))
    }

    /// Exit the program with this error.
    fn exit(&self) -> ! {
        match self {
            Self::ArgError(err) => err.exit(),
            Self::RuntimeError(err) => {
                eprintln!("{}", err);
                exit(1)
            }
        }
    }
}

impl From<clap::Error> for AppError {
    fn from(err: clap::Error) -> Self {
        Self::ArgError(err)
    }
}

impl From<ImageError> for AppError {
    fn from(err: ImageError) -> Self {
        Self::RuntimeError(Box::new(err))
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        Self::RuntimeError(Box::new(err))
    }
}

impl From<MosaicError> for AppError {
    fn from(err: MosaicError) -> Self {
        Self::RuntimeError(Box::new(err))
    }
}

impl From<DrawError> for AppError {
    fn from(err: DrawError) -> Self {
        Self::RuntimeError(Box::new(err))
    }
}

/// Result type for this app.
type AppResult<T> = Result<T, AppError>;

/// Render a photo mosaic of a target image out of a set of source images.
#[derive(Debug, Parser)]
#[command(version, about, disable_help_flag = true)]
struct Args {
    /// The image to reproduce
    #[arg(short, long)]
    target: String,

    /// Source images, or directories of them
    #[arg(required = true)]
    sources: Vec<PathBuf>,

    /// The width of the generated image
    #[arg(short, long, default_value_t = 800)]
    width: u32,

    /// The height of the generated image
    #[arg(short, long, default_value_t = 800)]
    height: u32,

    /// The number of columns in the grid
    #[arg(short, long, default_value_t = 40)]
    columns: u32,

    /// The number of rows in the grid
    #[arg(short, long, default_value_t = 40)]
    rows: u32,

    /// How much of the flat target color to blend over each tile, from 0 to 1
    #[arg(short, long, default_value_t = 0.2)]
    blending: f64,

    /// Cross-origin mode passed through to the image fetcher
    #[arg(long)]
    cross_origin: Option<String>,

    /// Report the cell under pixel X,Y of the generated image
    #[arg(long, value_name = "X,Y")]
    inspect: Option<String>,

    /// Save the image to PATH
    #[arg(short, long, value_name = "PATH", default_value = "mosaic.png")]
    output: PathBuf,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}

impl Args {
    fn validate(self) -> AppResult<Self> {
        if self.width == 0 || self.height == 0 || self.columns == 0 || self.rows == 0 {
            return Err(AppError::invalid_value(
                "width, height, columns and rows must be positive",
            ));
        }

        if !(0.0..=1.0).contains(&self.blending) {
            return Err(AppError::invalid_value(&format!(
                "blending of {} is not between 0 and 1",
                self.blending
            )));
        }

        Ok(self)
    }

    /// Parse the --inspect coordinates.
    fn inspect(&self) -> AppResult<Option<(f64, f64)>> {
        let arg = match &self.inspect {
            Some(arg) => arg,
            None => return Ok(None),
        };

        let coords: Vec<_> = arg.split(',').map(|s| s.trim().parse::<f64>().ok()).collect();
        match coords.as_slice() {
            [Some(x), Some(y)] => Ok(Some((*x, *y))),
            _ => Err(AppError::invalid_value(&format!("invalid point {}", arg))),
        }
    }
}

/// The photo mosaic application itself.
#[derive(Debug)]
struct App {
    args: Args,
    start_time: Instant,
}

impl App {
    /// Make the App.
    fn new(args: Args) -> Self {
        Self {
            args,
            start_time: Instant::now(),
        }
    }

    fn run(&self) -> AppResult<()> {
        let inspect = self.args.inspect()?;
        let sources = expand_sources(&self.args.sources)?;

        let loader = ImageLoader::new(FileFetcher).with_cross_origin(self.args.cross_origin.clone());
        let mut mosaic: Mosaic<_> = Mosaic::new(Rc::new(loader));

        let args = &self.args;
        mosaic.set_size(args.width, args.height, args.columns, args.rows)?;
        mosaic.set_blending(args.blending)?;

        eprintln!(
            "Generating a {}x{} mosaic ({}x{} cells) from {} sources",
            args.width,
            args.height,
            args.columns,
            args.rows,
            sources.len(),
        );

        let start_time = self.start_time;
        let total = sources.len();
        let (_, drawn) = block_on(mosaic.update_sources(&sources, |progress| {
            // Ignore terminal errors
            let _ = print_progress(progress, total, start_time);
        }));
        drawn?;

        if mosaic.grid().pool_size() == 0 {
            return Err(AppError::RuntimeError("none of the source images could be loaded".into()));
        }

        match block_on(mosaic.set_target(args.target.as_str()))? {
            Applied::Drawn => {}
            applied => {
                return Err(AppError::RuntimeError(
                    format!("mosaic was not drawn ({:?})", applied).into(),
                ));
            }
        }

        let surface = match mosaic.surface() {
            Some(surface) => surface,
            None => return Err(AppError::RuntimeError("mosaic is not ready".into())),
        };
        surface.save(&args.output)?;

        if let Some((x, y)) = inspect {
            match mosaic.click(x, y) {
                Some(info) => println!(
                    "column {}, row {}: {} from {}",
                    info.column,
                    info.row,
                    info.color,
                    info.image.src(),
                ),
                None => println!("({}, {}) is outside the mosaic", x, y),
            }
        }

        Ok(())
    }
}

/// Expand directories into the image files they contain.
fn expand_sources(paths: &[PathBuf]) -> AppResult<Vec<String>> {
    let mut sources = Vec::new();

    for path in paths {
        if path.is_dir() {
            let mut files: Vec<PathBuf> = fs::read_dir(path)?
                .map(|entry| entry.map(|e| e.path()))
                .collect::<io::Result<_>>()?;
            files.retain(|p| p.is_file() && is_image(p));
            files.sort();
            sources.extend(files.iter().map(|p| p.to_string_lossy().into_owned()));
        } else {
            sources.push(path.to_string_lossy().into_owned());
        }
    }

    Ok(sources)
}

/// Whether a file looks like an image we can decode.
fn is_image(path: &Path) -> bool {
    image::ImageFormat::from_path(path).is_ok()
}

fn print_progress(progress: f64, total: usize, start_time: Instant) -> io::Result<()> {
    let mut term = match term::stderr() {
        Some(term) => term,
        None => return Ok(()),
    };

    // The loader resets to 1 once everything has settled
    let done = if progress >= 1.0 {
        total
    } else {
        (progress * total as f64).round() as usize
    };
    let rate = done as f64 / start_time.elapsed().as_secs_f64();
    let newline = if done == total { "\n" } else { "" };

    term.carriage_return()?;
    term.delete_line()?;

    write!(
        term,
        "{:>6.2}%  | {:4.0} img/s  | loaded {} of {}{}",
        100.0 * progress,
        rate,
        done,
        total,
        newline,
    )
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = match Args::try_parse().map_err(AppError::from).and_then(Args::validate) {
        Ok(args) => args,
        Err(e) => e.exit(),
    };

    match App::new(args).run() {
        Ok(_) => {}
        Err(e) => e.exit(),
    }
}
