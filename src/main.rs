use clap::Parser;

use log::{error, info};
use std::io::Write;

use dogprep::detector::resolve_model_path;
use dogprep::{process_dataset, Args, LazyModel};

fn main() {
    // Initialize the logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| writeln!(buf, "{}: {}", record.level(), record.args()))
        .init();
    let args = Args::parse();

    let model_path = match resolve_model_path(&args.coco) {
        Ok(path) => path,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    info!("Starting dataset preparation...");

    let model = LazyModel::onnx(model_path, args.input_size);
    match process_dataset(&args, &model) {
        Ok(stats) => {
            stats.print_summary();
            match stats.to_json() {
                Ok(json) => println!("{}", json),
                Err(e) => {
                    error!("Failed to serialize statistics: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Err(e) => {
            error!("Failed to process dataset: {}", e);
            std::process::exit(1);
        }
    }
}
