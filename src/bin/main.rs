use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, info, warn};
use tracing_subscriber::EnvFilter;
use webapp::{
    ApiConfig, ApiState, AuthConfig, DatabaseConfig, MemorySessionStore, NewUser, SessionConfig,
    SessionManager, TokenCodec, UserStore, WebConfig, WebState, create_api_router,
    create_web_router, open_user_store,
};

/// How often expired sessions are swept from memory.
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Parser)]
#[command(name = "webapp")]
#[command(about = "CRUD web application with JSON API and browser front ends")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Settings shared by every serving command.
#[derive(Args)]
struct ServeArgs {
    #[arg(long, env = "WEBAPP_DB_URL", default_value = "memory")]
    db_url: String,
    /// Issuer and audience of API tokens
    #[arg(long, env = "WEBAPP_DOMAIN", default_value = "example.com")]
    domain: String,
    /// HMAC secret for API tokens (a development secret is used if unset)
    #[arg(long, env = "WEBAPP_JWT_SECRET")]
    jwt_secret: Option<String>,
    /// Origin allowed to call the API with credentials
    #[arg(long, env = "WEBAPP_ALLOWED_ORIGIN", default_value = "http://localhost:8080")]
    allowed_origin: String,
    /// Mark the session cookie Secure
    #[arg(long, default_value_t = false)]
    secure_cookie: bool,
    /// Directory profile pictures are written to
    #[arg(long, env = "WEBAPP_UPLOAD_DIR", default_value = "./static/img")]
    upload_dir: PathBuf,
    /// Create this admin account at startup if it does not exist
    #[arg(long, env = "WEBAPP_ADMIN_EMAIL")]
    admin_email: Option<String>,
    #[arg(long, env = "WEBAPP_ADMIN_PASSWORD", hide_env_values = true)]
    admin_password: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the API and web servers together
    Serve {
        #[arg(long, default_value = "8090")]
        api_port: u16,
        #[arg(long, default_value = "8080")]
        web_port: u16,
        #[command(flatten)]
        args: ServeArgs,
    },
    /// Run only the JSON API server
    Api {
        #[arg(short, long, default_value = "8090")]
        port: u16,
        #[command(flatten)]
        args: ServeArgs,
    },
    /// Run only the browser-facing web server
    Web {
        #[arg(short, long, default_value = "8080")]
        port: u16,
        #[command(flatten)]
        args: ServeArgs,
    },
    /// Initialize the database
    Init {
        #[arg(long, env = "WEBAPP_DB_URL", default_value = "memory")]
        db_url: String,
    },
    /// Create a user account
    CreateUser {
        #[arg(long)]
        email: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long, env = "WEBAPP_USER_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long, default_value_t = false)]
        admin: bool,
        #[arg(long, env = "WEBAPP_DB_URL", default_value = "memory")]
        db_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("webapp=info".parse()?)
                .add_directive("surrealdb=warn".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            api_port,
            web_port,
            args,
        } => {
            let users = Arc::new(prepare_users(&args).await?);
            let api_app = create_api_router(api_state(&args, users.clone()), &api_config(&args))?;
            let web_app = create_web_router(web_state(&args, users), session_manager(&args));

            let api_listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", api_port)).await?;
            let web_listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", web_port)).await?;

            info!("API server listening on http://0.0.0.0:{}", api_port);
            info!("Web server listening on http://0.0.0.0:{}", web_port);

            tokio::try_join!(
                axum::serve(
                    api_listener,
                    api_app.into_make_service_with_connect_info::<SocketAddr>()
                ),
                axum::serve(
                    web_listener,
                    web_app.into_make_service_with_connect_info::<SocketAddr>()
                ),
            )?;
        }
        Commands::Api { port, args } => {
            let users = Arc::new(prepare_users(&args).await?);
            let app = create_api_router(api_state(&args, users), &api_config(&args))?;

            let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
            info!("API server listening on http://0.0.0.0:{}", port);
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await?;
        }
        Commands::Web { port, args } => {
            let users = Arc::new(prepare_users(&args).await?);
            let app = create_web_router(web_state(&args, users), session_manager(&args));

            let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
            info!("Web server listening on http://0.0.0.0:{}", port);
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await?;
        }
        Commands::Init { db_url } => {
            let db_config = DatabaseConfig {
                url: db_url,
                ..Default::default()
            };
            info!("Using database url for initialization: {}", db_config.url);

            info!("Initializing database...");
            open_user_store(db_config).await?;
            info!("Database initialized successfully");
        }
        Commands::CreateUser {
            email,
            first_name,
            last_name,
            password,
            admin,
            db_url,
        } => {
            let store = open_user_store(DatabaseConfig {
                url: db_url,
                ..Default::default()
            })
            .await?;

            let created = store
                .create_user(NewUser {
                    first_name,
                    last_name,
                    email: email.clone(),
                    password,
                    is_admin: admin,
                })
                .await?;

            match created {
                Some(id) => println!("Created user {} with id {}", email, id),
                None => println!("A user with email {} already exists", email),
            }
        }
    }

    Ok(())
}

/// Open the user store and seed the configured admin account.
async fn prepare_users(args: &ServeArgs) -> Result<UserStore> {
    let db_config = DatabaseConfig {
        url: args.db_url.clone(),
        ..Default::default()
    };
    info!("Using database url: {}", db_config.url);
    let store = open_user_store(db_config).await?;

    if let (Some(email), Some(password)) = (&args.admin_email, &args.admin_password) {
        let created = store
            .create_user(NewUser {
                first_name: "Admin".to_string(),
                last_name: "User".to_string(),
                email: email.clone(),
                password: password.clone(),
                is_admin: true,
            })
            .await?;
        if let Some(id) = created {
            info!(user_id = id, "seeded admin account {}", email);
        }
    }

    Ok(store)
}

fn api_state(args: &ServeArgs, users: Arc<UserStore>) -> ApiState {
    let defaults = AuthConfig::default();
    let auth = AuthConfig {
        domain: args.domain.clone(),
        jwt_secret: args.jwt_secret.clone().unwrap_or(defaults.jwt_secret.clone()),
        ..defaults
    };
    if auth.uses_dev_secret() {
        warn!("No WEBAPP_JWT_SECRET configured; using the development signing secret");
    }

    ApiState::new(Arc::new(TokenCodec::new(&auth)), users)
}

fn api_config(args: &ServeArgs) -> ApiConfig {
    ApiConfig {
        allowed_origin: args.allowed_origin.clone(),
    }
}

fn web_state(args: &ServeArgs, users: Arc<UserStore>) -> WebState {
    WebState::new(
        users,
        WebConfig {
            upload_dir: args.upload_dir.clone(),
            ..Default::default()
        },
    )
}

/// Session manager over a memory store, with a background sweep of
/// expired sessions.
fn session_manager(args: &ServeArgs) -> SessionManager {
    let store = Arc::new(MemorySessionStore::new());

    let sweeper = store.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            sweeper.cleanup_expired().await;
        }
    });

    SessionManager::new(
        store,
        SessionConfig {
            secure_cookie: args.secure_cookie,
            ..Default::default()
        },
    )
}
