use std::sync::Arc;

use clap::{Parser, Subcommand};
use reqwest::cookie::Jar;
use url::Url;

use edge_mediator::navigation::{FetchOutcome, FetchRequest, NavigationInterceptor, ReqwestFetcher};

#[derive(Parser)]
#[command(name = "edge-cli")]
#[command(about = "Client-side tooling for the edge mediator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Navigate to a URL through the navigation interceptor
    Navigate {
        url: Url,

        /// Cookie to seed the jar with, as name=value (repeatable)
        #[arg(short, long = "cookie")]
        cookies: Vec<String>,
    },
    /// Fetch the mediator's diagnostics page
    Info {
        /// Mediator base URL
        #[arg(default_value = "http://localhost:8080")]
        url: Url,

        #[arg(long, default_value = "/__edge")]
        prefix: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Navigate { url, cookies } => {
            let jar = Arc::new(Jar::default());
            for cookie in &cookies {
                if !cookie.contains('=') {
                    return Err(format!("cookie '{}' is not name=value", cookie).into());
                }
                jar.add_cookie_str(cookie, &url);
            }

            let interceptor = NavigationInterceptor::register(ReqwestFetcher::new(jar)?, 1);
            match interceptor.handle_fetch(FetchRequest::navigate(url)).await? {
                FetchOutcome::Respond(response) => {
                    println!("{} {}", response.status, response.url);
                    for (name, value) in response.headers.iter() {
                        println!("{}: {}", name, value.to_str().unwrap_or("<binary>"));
                    }
                    println!("\n{} bytes", response.body.len());
                }
                FetchOutcome::PassThrough => println!("not intercepted"),
            }
        }
        Commands::Info { url, prefix } => {
            let res = reqwest::get(url.join(&prefix)?).await?;
            let status = res.status();
            if !status.is_success() {
                eprintln!("Error: diagnostics returned status {}", status);
            }
            println!("{}", res.text().await?);
        }
    }

    Ok(())
}
