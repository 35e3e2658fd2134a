use clap::{Args, Parser, Subcommand};
use log::{error, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use rust_digitnet::error::{Resource, Result};
use rust_digitnet::linalg::{default_backend, Backend};
use rust_digitnet::model::neural_net::NeuralNet;
use rust_digitnet::model::{
    evaluate, persist, IterationRecord, Model, TrainConfig, DIGIT_CLASSIFIER,
};
use rust_digitnet::parsing::{bitmap, idx, image_input, mnist, Batch, RawDataset};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train the network and save its parameters
    Train(TrainArgs),
    /// Measure the accuracy of saved parameters on the test set
    Test(TestArgs),
    /// Guess the digit in a 28x28, 24 bits-per-pixel bitmap
    Classify(ClassifyArgs),
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// The path of the training images (IDX format)
    #[arg(long, default_value = "data/train-images.idx3-ubyte")]
    images: PathBuf,

    /// The path of the training labels (IDX format)
    #[arg(long, default_value = "data/train-labels.idx1-ubyte")]
    labels: PathBuf,

    /// Read the training set from a CSV file of <label>,<pixels...> records instead
    #[arg(long, conflicts_with_all = ["images", "labels"])]
    csv: Option<PathBuf>,

    /// Number of gradient descent iterations over the full training set
    #[arg(short = 'n', long, default_value_t = TrainConfig::default().iterations)]
    iterations: usize,

    /// Learning rate of the network
    #[arg(short, long, default_value_t = TrainConfig::default().learning_rate)]
    learning_rate: f64,

    /// Seed for the weight initialization
    /// If this parameter is not provided, the weights are seeded from system entropy
    #[arg(short, long, default_value = None)]
    seed: Option<u64>,

    /// Only train on the first N samples
    #[arg(long, default_value = None)]
    limit: Option<usize>,

    /// Where to save the trained parameters
    #[arg(short, long, default_value = "brainsave")]
    model: PathBuf,

    /// Debug mode (save the training accuracy and loss per iteration as CSV)
    #[arg(long, default_value = None)]
    history: Option<PathBuf>,

    /// Also export the weights in JSON format
    #[arg(long, default_value = None)]
    export_json: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct TestArgs {
    /// The path of the test images (IDX format)
    #[arg(long, default_value = "data/t10k-images.idx3-ubyte")]
    images: PathBuf,

    /// The path of the test labels (IDX format)
    #[arg(long, default_value = "data/t10k-labels.idx1-ubyte")]
    labels: PathBuf,

    /// Read the test set from a CSV file of <label>,<pixels...> records instead
    #[arg(long, conflicts_with_all = ["images", "labels"])]
    csv: Option<PathBuf>,

    /// The saved parameters to test
    #[arg(short, long, default_value = "brainsave")]
    model: PathBuf,
}

#[derive(Args, Debug)]
struct ClassifyArgs {
    /// The image to classify
    image: PathBuf,

    /// The saved parameters to classify with
    #[arg(short, long, default_value = "brainsave")]
    model: PathBuf,
}

fn load_dataset(
    images: &Path,
    labels: &Path,
    csv: Option<&Path>,
    resource: Resource,
) -> Result<RawDataset> {
    let dataset = match csv {
        Some(path) => mnist::load(path, resource)?,
        None => idx::load(images, labels, resource)?,
    };

    info!("Loaded {} samples of {}", dataset.len(), resource);

    Ok(dataset)
}

/// Write the per-iteration history to a CSV file
fn write_history(path: &Path, history: &[IterationRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;

    for record in history {
        writer.serialize(record)?;
    }
    writer.flush()?;

    Ok(())
}

fn train<B: Backend>(backend: &B, args: TrainArgs) -> Result<()> {
    let mut dataset = load_dataset(
        &args.images,
        &args.labels,
        args.csv.as_deref(),
        Resource::TrainingData,
    )?;
    if let Some(limit) = args.limit {
        dataset.truncate(limit);
    }

    let batch = Batch::from_raw(&dataset, Resource::TrainingData)?;
    drop(dataset);

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut neural_net = NeuralNet::new(&DIGIT_CLASSIFIER, &mut rng)?;
    let config = TrainConfig {
        iterations: args.iterations,
        learning_rate: args.learning_rate,
    };

    let history = neural_net.fit(backend, &batch, &config)?;

    persist::save(&neural_net, &args.model)?;
    info!("Saved parameters to {:?}", args.model);

    if let Some(path) = args.history {
        write_history(&path, &history)?;
    }

    if let Some(path) = args.export_json {
        persist::export_json(&neural_net, &path)?;
    }

    Ok(())
}

/// Test the model on the test set
fn test<B: Backend>(backend: &B, args: TestArgs) -> Result<()> {
    let dataset = load_dataset(
        &args.images,
        &args.labels,
        args.csv.as_deref(),
        Resource::TestData,
    )?;
    let neural_net = persist::load(&args.model, &DIGIT_CLASSIFIER)?;
    let batch = Batch::from_raw(&dataset, Resource::TestData)?;

    let predictions = neural_net.predict(backend, &batch.pixels)?;
    let accuracy = evaluate::score(&predictions, &batch.labels)?;

    println!("Accuracy: {:.2}%.", 100f64 * accuracy);

    Ok(())
}

fn classify<B: Backend>(backend: &B, args: ClassifyArgs) -> Result<()> {
    let neural_net = persist::load(&args.model, &DIGIT_CLASSIFIER)?;
    let pixels = bitmap::read_image(&args.image)?;
    let input = image_input(&pixels)?;

    let predictions = neural_net.predict(backend, &input)?;
    let digit = predictions.argmax_columns()[0];

    println!("Looks like a {} to me.", digit);

    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let backend = default_backend()?;

    match cli.command {
        Command::Train(args) => train(&backend, args),
        Command::Test(args) => test(&backend, args),
        Command::Classify(args) => classify(&backend, args),
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            err.exit_code()
        }
    }
}
