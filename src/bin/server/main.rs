#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    missing_docs,
    rustdoc::broken_intra_doc_links,
    rustdoc::missing_crate_level_docs
)]

//! SMTP gateway that relays mail through Resend

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use clap::Parser;
use resend_smtp_gateway::{
    domain::communication::delivery::{DeliveryConfig, DeliveryServiceImpl, DEFAULT_SEND_TIMEOUT},
    infrastructure::{
        email::resend::{ResendConfig, ResendMailer},
        logging::{init_tracing, LogConfig, TracingEventLogger},
        smtp::{Server, SmtpServer, SmtpServerConfig},
    },
};

/// Delivery settings
#[derive(Debug, Clone, Parser)]
pub struct DeliveryArgs {
    /// Seconds to wait for Resend; zero, negative or invalid values use the default
    #[clap(long, env = "SEND_TIMEOUT_SECONDS", default_value = "15")]
    pub send_timeout_seconds: String,

    /// Cancel sends still running when the timeout expires
    #[clap(long, env = "SEND_CANCEL_ON_TIMEOUT", default_value = "false")]
    pub send_cancel_on_timeout: bool,
}

impl DeliveryArgs {
    fn config(&self) -> DeliveryConfig {
        let send_timeout = self
            .send_timeout_seconds
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|seconds| *seconds > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_SEND_TIMEOUT);

        DeliveryConfig {
            send_timeout,
            cancel_on_timeout: self.send_cancel_on_timeout,
        }
    }
}

/// Command-line arguments / environment variables
#[derive(Debug, Parser)]
pub struct Args {
    /// The SMTP server configuration
    #[clap(flatten)]
    pub smtp: SmtpServerConfig,

    /// The Resend API configuration
    #[clap(flatten)]
    pub resend: ResendConfig,

    /// The delivery settings
    #[clap(flatten)]
    pub delivery: DeliveryArgs,

    /// The logging configuration
    #[clap(flatten)]
    pub log: LogConfig,
}

#[mutants::skip]
#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Failed to load environment: {}", e);

            return Err(e.into());
        }
    }

    let args = Args::parse();

    init_tracing(&args.log)?;

    let mailer = Arc::new(ResendMailer::new(args.resend)?);
    let delivery = DeliveryServiceImpl::new(
        mailer,
        Arc::new(TracingEventLogger),
        args.delivery.config(),
    );

    SmtpServer::new(delivery, args.smtp).await?.run().await
}
