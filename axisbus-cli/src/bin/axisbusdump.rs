use clap::Parser;
use axisbus_controller::common::{
    messages::{DriveMessage, MessageError},
    CanMessage,
};

#[cfg(feature = "socketcan")]
use axisbus_controller::common::{open_socketcan, traits::CanReceiver};

#[derive(Parser)]
struct Args {
    socket: String,
    #[clap(short, long)]
    verbose: bool,
}

pub enum Message {
    Unrecognized {
        msg: CanMessage,
        reason: MessageError,
    },
    Recognized(DriveMessage),
}

impl From<CanMessage> for Message {
    fn from(msg: CanMessage) -> Self {
        // Attempt to parse as a drive message, and fall back to displaying it as a generic can
        // message
        match msg.try_into() {
            Ok(msg) => Message::Recognized(msg),
            Err(e) => Message::Unrecognized { msg, reason: e },
        }
    }
}

#[tokio::main]
async fn main() {
    #[cfg(not(feature = "socketcan"))]
    {
        let _ = Args::parse();
        panic!("This program is only supported with socketcan")
    }

    #[cfg(feature = "socketcan")]
    {
        env_logger::init();
        let args = Args::parse();
        let (_tx, mut rx) = match open_socketcan(&args.socket) {
            Ok(pair) => pair,
            Err(e) => {
                eprintln!("Cannot open {}: {e}", args.socket);
                std::process::exit(1);
            }
        };

        let mut interval = tokio::time::interval(std::time::Duration::from_millis(1));
        loop {
            interval.tick().await;
            while let Some(msg) = rx.try_recv() {
                let time = chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, false);

                match msg.into() {
                    Message::Recognized(msg) => println!("{time}: {msg:?}"),
                    Message::Unrecognized { msg, reason } => {
                        println!("{time}: {msg:?}");
                        if args.verbose {
                            println!("Unrecognized reason: {reason}");
                        }
                    }
                }
            }
        }
    }
}
