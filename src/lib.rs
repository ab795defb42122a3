pub mod files;
pub mod media;
pub mod subtitle;
pub mod supervisor;
pub mod task;
pub mod transcribe;
pub mod utils;
pub mod web;

use std::{env, sync::Arc};

use files::FileStore;
use once_cell::sync::Lazy;
use task::TaskRegistry;

pub struct AppContext {
    pub registry: Arc<TaskRegistry>,
    pub files: Arc<FileStore>,
}

const UPLOAD_PATH_DEFAULT: &str = "./scribe_data/uploads";
const TEMP_PATH_DEFAULT: &str = "./scribe_data/temp";
const MODELS_PATH_DEFAULT: &str = "./models/whisper";
const WHISPER_PATH_DEFAULT: &str = "./whisper/whisper-cli";

fn env_or(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(value) => value,
        Err(_) => dotenv::var(key).unwrap_or_else(|_| default.to_string()),
    }
}

pub static UPLOAD_PATH: Lazy<String> = Lazy::new(|| env_or("SCRIBE_UPLOAD_PATH", UPLOAD_PATH_DEFAULT));

pub static TEMP_PATH: Lazy<String> = Lazy::new(|| env_or("SCRIBE_TEMP_PATH", TEMP_PATH_DEFAULT));

pub static MODELS_PATH: Lazy<String> = Lazy::new(|| env_or("SCRIBE_MODELS_PATH", MODELS_PATH_DEFAULT));

pub static WHISPER_PATH: Lazy<String> = Lazy::new(|| env_or("SCRIBE_WHISPER_PATH", WHISPER_PATH_DEFAULT));

pub static TASK_CAPACITY: Lazy<usize> =
    Lazy::new(|| env_or("SCRIBE_TASK_CAPACITY", "100").parse().unwrap_or(100));

pub static TASK_RETENTION_SECS: Lazy<i64> =
    Lazy::new(|| env_or("SCRIBE_TASK_RETENTION_SECS", "86400").parse().unwrap_or(86400));

pub fn init_env() {
    dotenv::dotenv().ok();

    // 确保数据目录存在
    for dir in [UPLOAD_PATH.as_str(), TEMP_PATH.as_str(), MODELS_PATH.as_str()] {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("Failed to create directory {}: {}", dir, e);
        }
    }
}
