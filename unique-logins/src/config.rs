use std::net::SocketAddr;

use envconfig::Envconfig;

#[derive(Envconfig, Clone)]
pub struct Config {
    pub stream_name: String,

    #[envconfig(default = "us-east-1")]
    pub aws_region: String,
    pub aws_endpoint: Option<String>,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,

    // Buffered records are handed to the processor once either threshold trips.
    #[envconfig(default = "500")]
    pub buffer_size: usize,
    #[envconfig(default = "5000")]
    pub buffer_time_ms: u64,

    #[envconfig(default = "60000")]
    pub flush_period_ms: u64,

    #[envconfig(default = "10")]
    pub dedup_window_minutes: u64,
    #[envconfig(default = "100000")]
    pub dedup_max_entries: u64,

    #[envconfig(default = "output")]
    pub output_base_dir: String,

    #[envconfig(default = "false")]
    pub print_sink: bool,

    #[envconfig(default = "true")]
    pub export_prometheus: bool,
    #[envconfig(default = "127.0.0.1:9102")]
    pub metrics_address: SocketAddr,
}
