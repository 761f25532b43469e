use clap::{Parser, Subcommand};
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Map, Value};

#[derive(Parser)]
#[command(name = "command-cli")]
#[command(about = "Client for the command server", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run any command with raw JSON arguments
    Run {
        /// Command name
        cmd: String,
        /// Arguments object as JSON
        #[arg(long, default_value = "{}")]
        args: String,
    },
    /// Run the fetch command
    Fetch {
        /// HTTP method
        method: String,
        /// Target URL
        target: String,
        /// Request header as NAME:VALUE (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
        /// Request body as JSON
        #[arg(long)]
        body: Option<String>,
        /// Stream the response as events
        #[arg(long)]
        stream: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let envelope = match cli.command {
        Commands::Run { cmd, args } => {
            let args: Value = serde_json::from_str(&args)?;
            json!({ "cmd": cmd, "args": args })
        }
        Commands::Fetch {
            method,
            target,
            headers,
            body,
            stream,
        } => {
            let mut args = Map::new();
            args.insert("method".into(), json!(method));
            args.insert("url".into(), json!(target));
            args.insert("headers".into(), Value::Object(parse_headers(&headers)?));
            if let Some(body) = body {
                args.insert("body".into(), serde_json::from_str(&body)?);
            }
            args.insert("stream".into(), json!(stream));
            json!({ "cmd": "fetch", "args": args })
        }
    };

    let res = reqwest::Client::new()
        .post(&cli.url)
        .json(&envelope)
        .send()
        .await?;
    print_response(res).await
}

fn parse_headers(raw: &[String]) -> Result<Map<String, Value>, Box<dyn std::error::Error>> {
    let mut headers = Map::new();
    for entry in raw {
        let (name, value) = entry
            .split_once(':')
            .ok_or_else(|| format!("header '{}' must be NAME:VALUE", entry))?;
        headers.insert(name.trim().to_string(), json!(value.trim()));
    }
    Ok(headers)
}

async fn print_response(mut res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let streaming = res
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/event-stream"));

    if streaming {
        while let Some(chunk) = res.chunk().await? {
            print!("{}", String::from_utf8_lossy(&chunk));
        }
        return Ok(());
    }

    let status = res.status();
    let text = res.text().await?;
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => {
            eprintln!("Error: server returned status {}", status);
            eprintln!("Response: {}", text);
        }
    }
    Ok(())
}
