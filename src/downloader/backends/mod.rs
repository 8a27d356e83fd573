// Engine implementations

pub mod deemix;
pub mod deezer;
pub mod spotify;
pub mod ytdlp;

pub use deemix::DeemixCli;
pub use deezer::{generate_download_object, DeezerApi, DeezerEngine};
pub use spotify::SpotifyPlugin;
pub use ytdlp::{YtDlp, YtDlpFactory};
