//! mcpipe CLI Client
//!
//! Command-line interface for talking to a memcached server.

use std::time::Duration;

use clap::{Parser, Subcommand};
use mcpipe::{Client, Config, CounterOptions, FlushOptions, Response, StoreOptions, Value};
use tracing_subscriber::{fmt, EnvFilter};

/// mcpipe CLI
#[derive(Parser, Debug)]
#[command(name = "mcpipe-cli")]
#[command(about = "Pipelined memcached binary protocol client")]
#[command(version)]
struct Args {
    /// Server address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:11211")]
    server: String,

    /// Connections in the pool
    #[arg(short, long, default_value = "1")]
    pool_size: usize,

    /// SASL PLAIN username
    #[arg(short, long, requires = "password")]
    username: Option<String>,

    /// SASL PLAIN password
    #[arg(long, requires = "username")]
    password: Option<String>,

    /// Per-frame response timeout in milliseconds
    #[arg(short, long)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        key: String,
    },

    /// Get several keys in one pipelined batch
    Mget {
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Store a value unconditionally
    Set {
        key: String,
        value: String,

        /// Expiry in seconds
        #[arg(short, long, default_value = "0")]
        expires: u32,
    },

    /// Store a value if the key is absent
    Add {
        key: String,
        value: String,

        #[arg(short, long, default_value = "0")]
        expires: u32,
    },

    /// Store a value if the key is present
    Replace {
        key: String,
        value: String,

        #[arg(short, long, default_value = "0")]
        expires: u32,
    },

    /// Append to an existing value
    Append {
        key: String,
        value: String,
    },

    /// Prepend to an existing value
    Prepend {
        key: String,
        value: String,
    },

    /// Delete a key
    Delete {
        key: String,
    },

    /// Increment a counter
    Incr {
        key: String,

        #[arg(default_value = "1")]
        amount: u64,

        /// Value stored when the counter is missing
        #[arg(short, long, default_value = "0")]
        initial: u64,
    },

    /// Decrement a counter
    Decr {
        key: String,

        #[arg(default_value = "1")]
        amount: u64,

        #[arg(short, long, default_value = "0")]
        initial: u64,
    },

    /// Invalidate all items
    Flush {
        /// Delay in seconds before the flush takes effect
        #[arg(short, long, default_value = "0")]
        delay: u32,
    },

    /// Print the server version
    Version,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,mcpipe=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> mcpipe::Result<()> {
    let mut builder = Config::builder()
        .addr(&args.server)
        .pool_size(args.pool_size);
    if let (Some(username), Some(password)) = (args.username, args.password) {
        builder = builder.credentials(username, password);
    }
    if let Some(ms) = args.timeout_ms {
        builder = builder.response_timeout(Duration::from_millis(ms));
    }

    let client = Client::with_config(builder.build())?;
    tracing::debug!(server = %args.server, "mcpipe-cli v{}", mcpipe::VERSION);

    match args.command {
        Commands::Get { key } => print_response(&client.get(key)?),
        Commands::Mget { keys } => {
            for response in client.mget(&keys)? {
                print_response(&response?);
            }
        }
        Commands::Set { key, value, expires } => {
            print_response(&client.set(key, value, StoreOptions::default().expires(expires))?)
        }
        Commands::Add { key, value, expires } => {
            print_response(&client.add(key, value, StoreOptions::default().expires(expires))?)
        }
        Commands::Replace { key, value, expires } => {
            print_response(&client.replace(key, value, StoreOptions::default().expires(expires))?)
        }
        Commands::Append { key, value } => print_response(&client.append(key, value)?),
        Commands::Prepend { key, value } => print_response(&client.prepend(key, value)?),
        Commands::Delete { key } => print_response(&client.delete(key)?),
        Commands::Incr { key, amount, initial } => print_response(&client.increment(
            key,
            amount,
            CounterOptions::default().initial_value(initial),
        )?),
        Commands::Decr { key, amount, initial } => print_response(&client.decrement(
            key,
            amount,
            CounterOptions::default().initial_value(initial),
        )?),
        Commands::Flush { delay } => {
            print_response(&client.flush(FlushOptions::default().expires(delay))?)
        }
        Commands::Version => print_response(&client.version()?),
    }

    client.close();
    Ok(())
}

/// `key  STATUS  value`, with the value omitted when empty
fn print_response(response: &Response) {
    let key = String::from_utf8_lossy(&response.key);
    if response.value.is_empty() {
        println!("{}\t{}", key, response.status);
    } else {
        println!("{}\t{}\t{}", key, response.status, render(&response.value));
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        Value::Text(text) => text.clone(),
        Value::Integer(n) => n.to_string(),
        Value::List(items) => {
            let items: Vec<String> = items.iter().map(render).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Map(map) => {
            let entries: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", k, render(v)))
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
    }
}
