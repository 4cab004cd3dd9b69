use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use spotifusion::auth::{FileStore, SessionManager};
use spotifusion::config::{get_session_file_path, SpotifyConfig};
use spotifusion::errors::AppError;
use spotifusion::recommendations::{
    ExpansionMode, RecommendationEngine, RecommendationRequest, Seed, SeedList, TargetVector,
    DEFAULT_LIMIT,
};
use spotifusion::spotify::{SpotifyClient, TimeRange};

#[derive(Parser)]
#[command(name = "spotifusion", version, about = "Spotify login and seed-based recommendations")]
struct Cli {
    /// Session file; defaults to the user config directory
    #[arg(long, env = "SPOTIFUSION_SESSION")]
    session: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the authorization URL to open in a browser
    Login,
    /// Complete login with the redirect URL, its query string, or the bare code
    Callback { redirect: String },
    /// Show whether the stored access token is usable, refreshing it if needed
    Token,
    /// Recommend tracks from up to five seeds
    ///
    /// Seeds are `genre:<id>`, `artist:<id>`, `track:<id>`, a spotify: URI or
    /// an open.spotify.com link.
    Recommend {
        #[arg(required = true)]
        seeds: Vec<String>,
        #[arg(long, default_value_t = DEFAULT_LIMIT)]
        limit: usize,
        #[arg(long, default_value_t = 0.5)]
        danceability: f64,
        #[arg(long, default_value_t = 0.5)]
        energy: f64,
        #[arg(long, default_value_t = 0.5)]
        valence: f64,
        /// Expand all seeds at once
        #[arg(long)]
        concurrent: bool,
    },
    /// Suggest seeds for free text
    Suggest { query: String },
    /// Top artists and tracks
    Top {
        #[arg(long, default_value = "long_term")]
        range: TimeRange,
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
    /// Recently played tracks
    Recent {
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
    /// The current user's playlists
    Playlists {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Display name, avatar and plan of the logged-in user
    Profile,
    /// Forget the stored session
    Logout,
}

fn parse_seed(arg: &str) -> Result<Seed, AppError> {
    if arg.starts_with("spotify:") || arg.contains("open.spotify.com") {
        return Ok(Seed::from_link(arg)?);
    }
    match arg.split_once(':') {
        Some(("genre", id)) if !id.is_empty() => Ok(Seed::genre(id)),
        Some(("artist", id)) if !id.is_empty() => Ok(Seed::artist(id, id)),
        Some(("track", id)) if !id.is_empty() => Ok(Seed::track(id, id)),
        _ => Err(AppError::Validation(format!(
            "unrecognised seed '{}': expected genre:<id>, artist:<id>, track:<id> or a Spotify link",
            arg
        ))),
    }
}

fn client(session: &SessionManager) -> Result<SpotifyClient, AppError> {
    Ok(SpotifyClient::new(session.clone())?)
}

async fn run(command: Command, session: SessionManager) -> Result<(), AppError> {
    match command {
        Command::Login => {
            let url = session.begin_login()?;
            println!("Open this URL to authorize:\n{}", url);
        }
        Command::Callback { redirect } => {
            if redirect.contains('=') {
                session.handle_callback(&redirect).await?;
            } else {
                session.complete_login(redirect.trim()).await?;
            }
            println!("Logged in.");
        }
        Command::Token => {
            println!("State: {:?}", session.state()?);
            if session.is_authenticated() {
                session.get_valid_access_token().await?;
                println!("Access token is valid (state: {:?})", session.state()?);
            }
        }
        Command::Recommend {
            seeds,
            limit,
            danceability,
            energy,
            valence,
            concurrent,
        } => {
            let mut list = SeedList::new();
            for arg in &seeds {
                list.push(parse_seed(arg)?)?;
            }

            let request = RecommendationRequest::from(list)
                .with_target(TargetVector::new(danceability, energy, valence))
                .with_limit(limit);
            let mode = if concurrent {
                ExpansionMode::Concurrent
            } else {
                ExpansionMode::Sequential
            };
            let engine = RecommendationEngine::new(Arc::new(client(&session)?)).with_mode(mode);

            let tracks = engine.recommend(&request).await?;
            for (i, track) in tracks.iter().enumerate() {
                println!("{:>2}. {} - {}", i + 1, track.name, track.artists.join(", "));
            }
        }
        Command::Suggest { query } => {
            let engine = RecommendationEngine::new(Arc::new(client(&session)?));
            for seed in engine.suggest_seeds(&query, &SeedList::new()).await {
                println!("{:?}\t{}\t{}", seed.kind, seed.id, seed.label);
            }
        }
        Command::Top { range, limit } => {
            let client = client(&session)?;
            println!("Top artists ({}):", range);
            for artist in client.top_artists(limit, 0, range).await? {
                println!("  {}", artist.name);
            }
            println!("Top tracks ({}):", range);
            for track in client.top_tracks(limit, 0, range).await? {
                println!("  {} - {}", track.name, track.artist_names());
            }
        }
        Command::Recent { limit } => {
            for entry in client(&session)?.recently_played(limit).await? {
                println!(
                    "{}  {} - {}",
                    entry.played_at.format("%Y-%m-%d %H:%M"),
                    entry.track.name,
                    entry.track.artist_names()
                );
            }
        }
        Command::Playlists { limit } => {
            for playlist in client(&session)?.playlists(limit, 0).await? {
                println!("{}  ({} tracks)", playlist.name, playlist.track_count());
            }
        }
        Command::Profile => {
            let profile = client(&session)?.display_profile().await?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
        Command::Logout => {
            session.logout()?;
            println!("Logged out.");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = SpotifyConfig::from_env()?;

    let path = cli.session.unwrap_or_else(get_session_file_path);
    let store = FileStore::open(&path)
        .with_context(|| format!("Failed to open session store at {}", path.display()))?;
    let session = SessionManager::with_http(config, Arc::new(store))?;

    run(cli.command, session).await?;
    Ok(())
}
