use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "churn-server", version, about = "Customer churn inference server")]
pub struct Config {
    /// Exported pipeline artifact (JSON).
    #[arg(
        long,
        env = "MODEL_PATH",
        default_value = "models/final_logreg_smote_pipeline.json"
    )]
    pub model_path: PathBuf,

    /// JSON document holding `{"threshold": <float>}`.
    #[arg(long, env = "THRESH_PATH", default_value = "models/threshold.json")]
    pub thresh_path: PathBuf,

    #[arg(long = "bind", env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: SocketAddr,
}
