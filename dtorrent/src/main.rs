use clap::Parser;
use dtorrent::config::cfg::Cfg;
use dtorrent::session::alert::{Alert, Severity};
use dtorrent::session::facade::Session;
use dtorrent::torrent_parser::parser::TorrentParser;
use logger::logger_receiver::Logger;
use std::thread;
use std::time::Duration;

#[derive(Parser, Debug)]
struct Args {
    #[arg(short, long)]
    file: String,
    #[arg(short, long)]
    config: String,
}

fn main() {
    // Reads the filepath from the command line argument (Check README)
    let args = Args::parse();
    let file_path = args.file.trim().to_string();
    let config_path = args.config.trim();

    let metadata = TorrentParser::parse(file_path).expect("parser could not find the file");
    let config = Cfg::new(config_path).expect("Config file not found or incomplete");
    let logger = Logger::new(&config.log_directory, config.max_log_file_kb_size)
        .expect("logger could not be created");

    let session = Session::new(logger.new_sender(), config.extensions_enabled)
        .expect("failed to start session");
    session.set_severity_level(Severity::Info);
    session.listen_on(config.listen_port_lo, config.listen_port_hi);
    session.set_upload_rate_limit(config.upload_rate_limit);
    session.set_download_rate_limit(config.download_rate_limit);
    session.set_max_uploads(config.max_uploads);
    session.set_max_connections(config.max_connections);
    session.set_max_half_open_connections(config.half_open_limit);

    session
        .add_torrent(metadata, config.download_directory.clone(), Vec::new(), true, 16384)
        .expect("failed to queue torrent");

    println!("Session listening on port {}", session.listen_port());

    loop {
        while let Some(alert) = session.pop_alert() {
            match alert {
                Alert::ListenFailed { message } => println!("listen failed: {message}"),
                Alert::PeerError { message } => println!("peer error: {message}"),
                Alert::FileError { info_hash, message } => {
                    println!("file error on {:x?}: {message}", info_hash)
                }
                Alert::FastresumeRejected { info_hash, message } => {
                    println!("fastresume rejected on {:x?}: {message}", info_hash)
                }
                Alert::TorrentFinished { info_hash } => {
                    println!("torrent finished: {:x?}", info_hash)
                }
                Alert::TrackerAnnounce { info_hash, message } => {
                    println!("tracker announce on {:x?}: {message}", info_hash)
                }
            }
        }
        if session.get_torrents().is_empty() {
            break;
        }
        thread::sleep(Duration::from_millis(500));
    }

    session.shutdown();
}
