use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use saavn_player::catalog::client::{LISTING_LIMIT, SONG_PAGE_LIMIT};
use saavn_player::catalog::search::PageSource;
use saavn_player::catalog::{
    AlbumSearch, ArtistSearch, ArtistSongs, PlaylistSearch, SongSearch, suggested_songs,
};
use saavn_player::library::MoveDirection;
use saavn_player::playback::PlaybackSnapshot;
use saavn_player::{
    CatalogClient, Config, ConsoleTransport, CustomPlaylist, Downloader, FileStore, Library,
    LibraryStore, PlaybackCoordinator, PlaybackNotice, SaavnClient, SearchSession, Track,
    TransportEvent,
};

type AppLibrary = Library<FileStore>;

#[derive(Parser)]
#[command(name = "saavn-player")]
#[command(about = "Browse, play and collect music from the JioSaavn catalog")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum SearchKind {
    Songs,
    Albums,
    Playlists,
    Artists,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the catalog
    Search {
        query: String,

        #[arg(long, value_enum, default_value = "songs")]
        kind: SearchKind,

        /// Number of pages to load
        #[arg(long, default_value_t = 1)]
        pages: u32,
    },

    /// Show an album and its songs
    Album { id: String },

    /// Show a catalog playlist and its songs
    Playlist { id: String },

    /// Show an artist's songs
    Artist {
        id: String,

        #[arg(long, default_value_t = 1)]
        pages: u32,
    },

    /// Featured albums, playlists, charts and a song feed for a language
    Home {
        #[arg(long, default_value = "hindi")]
        language: String,
    },

    /// Songs suggested from your liked songs
    Suggest,

    /// List liked songs
    Liked,

    /// Like a song by id
    Like { song_id: String },

    /// Remove a song from liked songs
    Unlike { song_id: String },

    /// List recently played songs
    Recent,

    /// Manage your own playlists
    #[command(subcommand)]
    Playlists(PlaylistCommand),

    /// Download a song through the transcode server
    Download { song_id: String },

    /// Start an interactive listening session
    Listen {
        #[command(subcommand)]
        source: ListenSource,

        /// Queue position to start from (1-based)
        #[arg(long, global = true, default_value_t = 1)]
        start: usize,
    },
}

#[derive(Subcommand)]
enum PlaylistCommand {
    /// List your playlists
    List,
    /// Create a playlist
    Create { name: String },
    /// Add a song to a playlist
    Add { playlist: String, song_id: String },
    /// Remove a song from a playlist
    Remove { playlist: String, song_id: String },
    /// Rename a playlist
    Rename { playlist: String, new_name: String },
    /// Delete a playlist
    Delete { playlist: String },
    /// Move the song at a position (1-based) one step up
    MoveUp { playlist: String, position: usize },
    /// Move the song at a position (1-based) one step down
    MoveDown { playlist: String, position: usize },
}

#[derive(Subcommand)]
enum ListenSource {
    /// Play a catalog album
    Album { id: String },
    /// Play a catalog playlist
    Playlist { id: String },
    /// Play the first page of a song search
    Search { query: String },
    /// Play your liked songs
    Liked,
    /// Play recently played songs
    Recent,
    /// Play one of your playlists
    Mine { playlist: String },
}

fn setup_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_tracing(cli.verbose);

    let config = Config::from_env().context("Failed to load configuration")?;
    let library = Library::new(FileStore::new(&config.library_dir));

    match cli.command {
        Commands::Search { query, kind, pages } => {
            let catalog = Arc::new(SaavnClient::new(&config)?);
            search(catalog, &library, &query, kind, pages).await?;
        }
        Commands::Album { id } => {
            let catalog = SaavnClient::new(&config)?;
            let album = catalog.album(&id).await.context("Failed to fetch album")?;
            print_header(&album.name);
            print_tracks(&album.songs, &library).await;
        }
        Commands::Playlist { id } => {
            let catalog = SaavnClient::new(&config)?;
            let playlist = catalog
                .playlist(&id, LISTING_LIMIT)
                .await
                .context("Failed to fetch playlist")?;
            print_header(&playlist.name);
            if let Some(description) = playlist.description.filter(|d| !d.is_empty()) {
                println!("{}", description.cyan());
            }
            print_tracks(&playlist.songs, &library).await;
        }
        Commands::Artist { id, pages } => {
            let catalog = Arc::new(SaavnClient::new(&config)?);
            let session = SearchSession::new(ArtistSongs {
                catalog,
                artist_id: id.clone(),
            });
            let songs = collect_pages(&session, &id, pages).await?;
            print_header(&format!("Artist {}", id));
            if let Some(total) = session.total().await {
                println!("{} songs in catalog", total);
            }
            print_tracks(&songs, &library).await;
        }
        Commands::Home { language } => {
            let catalog = SaavnClient::new(&config)?;
            home(&catalog, &language, &library).await;
        }
        Commands::Suggest => {
            let catalog = SaavnClient::new(&config)?;
            let songs = suggested_songs(&catalog, &library).await;
            print_header("Suggested for you");
            if songs.is_empty() {
                println!("{}", "Like a few songs first to get suggestions".yellow());
            }
            print_tracks(&songs, &library).await;
        }
        Commands::Liked => {
            print_header("Liked songs");
            let liked = library.liked().await;
            print_tracks(&liked, &library).await;
        }
        Commands::Like { song_id } => {
            let catalog = SaavnClient::new(&config)?;
            let track = catalog.song(&song_id).await.context("Failed to fetch song")?;
            let liked = library.like(&track).await;
            println!(
                "{} {} ({} liked songs)",
                "Liked".green(),
                track.title,
                liked.len()
            );
        }
        Commands::Unlike { song_id } => {
            let liked = library.unlike(&song_id).await;
            println!("{} ({} liked songs)", "Removed".yellow(), liked.len());
        }
        Commands::Recent => {
            print_header("Recently played");
            let recents = library.recently_played().await;
            print_tracks(&recents, &library).await;
        }
        Commands::Playlists(command) => {
            manage_playlists(&config, &library, command).await?;
        }
        Commands::Download { song_id } => {
            let catalog = SaavnClient::new(&config)?;
            let track = catalog.song(&song_id).await.context("Failed to fetch song")?;
            download(&config, &track).await?;
        }
        Commands::Listen { source, start } => {
            let catalog = SaavnClient::new(&config)?;
            let queue = listen_queue(&catalog, &library, source).await?;
            listen(library, queue, start).await?;
        }
    }

    Ok(())
}

async fn search(
    catalog: Arc<SaavnClient>,
    library: &AppLibrary,
    query: &str,
    kind: SearchKind,
    pages: u32,
) -> Result<()> {
    print_header(&format!("Results for \"{}\"", query));

    match kind {
        SearchKind::Songs => {
            let session = SearchSession::new(SongSearch(catalog));
            let songs = collect_pages(&session, query, pages).await?;
            print_tracks(&songs, library).await;
        }
        SearchKind::Albums => {
            let session = SearchSession::new(AlbumSearch(catalog));
            for (i, album) in collect_pages(&session, query, pages).await?.iter().enumerate() {
                println!(
                    "{:3}. {} - {} {}",
                    i + 1,
                    album.name.green(),
                    album.primary_artist(),
                    format!("[{}]", album.id).dimmed()
                );
            }
        }
        SearchKind::Playlists => {
            let session = SearchSession::new(PlaylistSearch(catalog));
            for (i, playlist) in collect_pages(&session, query, pages).await?.iter().enumerate() {
                let count = playlist
                    .song_count
                    .as_ref()
                    .map(|c| c.to_string().trim_matches('"').to_string())
                    .unwrap_or_else(|| "?".to_string());
                println!(
                    "{:3}. {} ({} songs) {}",
                    i + 1,
                    playlist.name.green(),
                    count,
                    format!("[{}]", playlist.id).dimmed()
                );
            }
        }
        SearchKind::Artists => {
            let session = SearchSession::new(ArtistSearch(catalog));
            for (i, artist) in collect_pages(&session, query, pages).await?.iter().enumerate() {
                println!(
                    "{:3}. {} {}",
                    i + 1,
                    artist.name.green(),
                    format!("[{}]", artist.id).dimmed()
                );
            }
        }
    }

    Ok(())
}

async fn collect_pages<S>(session: &SearchSession<S>, query: &str, pages: u32) -> Result<Vec<S::Item>>
where
    S: PageSource,
{
    let mut items = session.search(query).await?;
    for _ in 1..pages {
        if !session.has_more().await {
            break;
        }
        items.extend(session.load_more().await?);
    }
    Ok(items)
}

async fn home(catalog: &SaavnClient, language: &str, library: &AppLibrary) {
    let (modules, songs) = tokio::join!(
        catalog.modules(language),
        catalog.random_songs(language, None)
    );

    let sections = [
        ("Albums", &modules.albums),
        ("Playlists", &modules.playlists),
        ("Charts", &modules.charts),
    ];
    for (title, items) in sections {
        if items.is_empty() {
            continue;
        }
        print_header(title);
        for item in items.iter().take(10) {
            println!("  {} {}", item.title.green(), format!("[{}]", item.id).dimmed());
        }
    }

    print_header(&format!("Fresh {} songs", language));
    print_tracks(&songs, library).await;
}

async fn manage_playlists(config: &Config, library: &AppLibrary, command: PlaylistCommand) -> Result<()> {
    match command {
        PlaylistCommand::List => {
            let playlists = library.playlists().await;
            if playlists.is_empty() {
                println!("{}", "No playlists found. Create one first.".yellow());
                return Ok(());
            }
            for (i, playlist) in playlists.iter().enumerate() {
                println!(
                    "{:2}. {} ({} songs) {}",
                    i + 1,
                    playlist.name.green(),
                    playlist.songs.len(),
                    format!("[{}]", playlist.id).dimmed()
                );
                for (j, song) in playlist.songs.iter().enumerate() {
                    println!("      {:2}. {} - {}", j + 1, song.title, song.artist_name);
                }
            }
        }
        PlaylistCommand::Create { name } => {
            let playlist = library
                .create_playlist(&name)
                .await
                .ok_or_else(|| anyhow!("Could not create playlist \"{}\"", name))?;
            println!("{} {} [{}]", "Created".green(), playlist.name, playlist.id);
        }
        PlaylistCommand::Add { playlist, song_id } => {
            let target = resolve_playlist(library, &playlist).await?;
            let track = find_known_track(library, &song_id).await;
            let track = match track {
                Some(track) => track,
                None => SaavnClient::new(config)?
                    .song(&song_id)
                    .await
                    .context("Failed to fetch song")?,
            };
            report(
                library.add_song_to_playlist(&target.id, &track).await,
                &format!("Added {} to {}", track.title, target.name),
                "Song already in playlist",
            );
        }
        PlaylistCommand::Remove { playlist, song_id } => {
            let target = resolve_playlist(library, &playlist).await?;
            report(
                library.remove_song_from_playlist(&target.id, &song_id).await,
                &format!("Removed from {}", target.name),
                "Song not in playlist",
            );
        }
        PlaylistCommand::Rename { playlist, new_name } => {
            let target = resolve_playlist(library, &playlist).await?;
            report(
                library.rename_playlist(&target.id, &new_name).await,
                &format!("Renamed {} to {}", target.name, new_name.trim()),
                "Please enter a valid playlist name",
            );
        }
        PlaylistCommand::Delete { playlist } => {
            let target = resolve_playlist(library, &playlist).await?;
            report(
                library.delete_playlist(&target.id).await,
                &format!("Deleted {}", target.name),
                "Playlist could not be deleted",
            );
        }
        PlaylistCommand::MoveUp { playlist, position } => {
            move_song(library, &playlist, position, MoveDirection::Up).await?;
        }
        PlaylistCommand::MoveDown { playlist, position } => {
            move_song(library, &playlist, position, MoveDirection::Down).await?;
        }
    }

    Ok(())
}

async fn move_song(
    library: &AppLibrary,
    playlist: &str,
    position: usize,
    direction: MoveDirection,
) -> Result<()> {
    let target = resolve_playlist(library, playlist).await?;
    let index = position
        .checked_sub(1)
        .ok_or_else(|| anyhow!("Positions start at 1"))?;
    report(
        library.move_song(&target.id, index, direction).await,
        "Moved",
        "Already at the edge of the playlist",
    );
    Ok(())
}

fn report(ok: bool, success: &str, failure: &str) {
    if ok {
        println!("{}", success.green());
    } else {
        println!("{}", failure.yellow());
    }
}

/// Looks a playlist up by id first, then by name.
async fn resolve_playlist(library: &AppLibrary, key: &str) -> Result<CustomPlaylist> {
    if let Some(playlist) = library.playlists().await.into_iter().find(|p| p.id == key) {
        return Ok(playlist);
    }
    library
        .find_playlist(key)
        .await
        .ok_or_else(|| anyhow!("No playlist matches \"{}\"", key))
}

/// Songs already in the library don't need a catalog round trip.
async fn find_known_track(library: &AppLibrary, song_id: &str) -> Option<Track> {
    let liked = library.liked().await;
    let recents = library.recently_played().await;
    liked
        .into_iter()
        .chain(recents)
        .find(|t| t.id == song_id)
}

async fn download(config: &Config, track: &Track) -> Result<()> {
    let downloader = Downloader::new(config)?;

    println!(
        "{} {}",
        "Downloading to".cyan(),
        downloader.target_dir().display()
    );

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}% {msg}")?
            .progress_chars("#>-"),
    );
    pb.set_message(track.title.clone());

    let outcome = downloader
        .download(track, |percent| pb.set_position(percent.round() as u64))
        .await;

    match outcome {
        Ok(outcome) => {
            pb.finish_with_message("done");
            println!(
                "{} {} ({} bytes)",
                "Saved to".green(),
                outcome.path.display(),
                outcome.bytes_written
            );
            Ok(())
        }
        Err(e) => {
            pb.abandon_with_message("failed");
            Err(e).context("Download failed")
        }
    }
}

async fn listen_queue(
    catalog: &SaavnClient,
    library: &AppLibrary,
    source: ListenSource,
) -> Result<Vec<Track>> {
    let queue = match source {
        ListenSource::Album { id } => catalog.album(&id).await?.songs,
        ListenSource::Playlist { id } => {
            catalog
                .playlist(&id, LISTING_LIMIT)
                .await?
                .songs
        }
        ListenSource::Search { query } => {
            catalog
                .search_songs(&query, 1, SONG_PAGE_LIMIT)
                .await?
                .results
        }
        ListenSource::Liked => library.liked().await,
        ListenSource::Recent => library.recently_played().await,
        ListenSource::Mine { playlist } => resolve_playlist(library, &playlist).await?.songs,
    };

    if queue.is_empty() {
        return Err(anyhow!("Nothing to play"));
    }
    Ok(queue)
}

async fn listen(library: AppLibrary, queue: Vec<Track>, start: usize) -> Result<()> {
    let (transport, events) = ConsoleTransport::new();
    let coordinator = PlaybackCoordinator::new(transport, library);
    let relay = coordinator.attach(events)?;

    let mut notices = coordinator.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(notice) = notices.recv().await {
            match notice {
                PlaybackNotice::TrackChanged { track, index } => {
                    let position = index.map(|i| format!("#{} ", i + 1)).unwrap_or_default();
                    println!(
                        "{} {}{} - {}",
                        "Now playing".green().bold(),
                        position,
                        track.title,
                        track.artist_name
                    );
                }
                PlaybackNotice::Stopped => println!("{}", "Stopped".yellow()),
                PlaybackNotice::PlaybackError(message) => {
                    println!("{} {}", "Playback error:".red(), message);
                }
            }
        }
    });

    let first = queue
        .get(start.saturating_sub(1))
        .or_else(|| queue.first())
        .cloned();
    coordinator.play(first, queue).await;

    print_listen_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("n"), _) => {
                coordinator.next().await;
            }
            (Some("p"), _) => {
                coordinator.previous().await;
            }
            (Some("t"), _) => {
                let state = coordinator.toggle_playback().await;
                println!("{}", state.to_string().cyan());
            }
            (Some("seek"), Some(secs)) => match seek_target_ms(secs) {
                Some(position_ms) => coordinator.seek(position_ms).await,
                None => println!("{}", "seek expects seconds".yellow()),
            },
            (Some("ff"), _) => coordinator.skip_forward().await,
            (Some("rw"), _) => coordinator.skip_backward().await,
            (Some("end"), _) => coordinator.transport().simulate(TransportEvent::TrackEnded),
            (Some("rnext"), _) => coordinator.transport().simulate(TransportEvent::RemoteNext),
            (Some("rprev"), _) => coordinator
                .transport()
                .simulate(TransportEvent::RemotePrevious),
            (Some("err"), _) => coordinator
                .transport()
                .simulate(TransportEvent::PlaybackError("simulated engine failure".into())),
            (Some("like"), _) => match coordinator.toggle_like_current().await {
                Some(true) => println!("{}", "Liked".green()),
                Some(false) => println!("{}", "Removed from liked songs".yellow()),
                None => println!("{}", "Nothing is playing".yellow()),
            },
            (Some("s"), _) => {
                print_snapshot(&coordinator.snapshot().await);
                if let Some(loaded) = coordinator.transport().loaded() {
                    println!("{} {}", "Engine:".cyan(), loaded.url.dimmed());
                }
            }
            (Some("q"), _) => break,
            (Some(_), _) => print_listen_help(),
            (None, _) => {}
        }
    }

    coordinator.close().await;
    relay.shutdown().await;
    printer.abort();

    Ok(())
}

/// Parses a `seek` argument in whole seconds into milliseconds.
fn seek_target_ms(arg: &str) -> Option<u64> {
    arg.parse::<u64>().ok().map(|secs| secs.saturating_mul(1000))
}

fn print_listen_help() {
    println!(
        "{}",
        "n next | p previous | t play/pause | seek <s> | ff/rw 15s | end | rnext | rprev | err | like | s status | q quit"
            .dimmed()
    );
}

fn print_snapshot(snapshot: &PlaybackSnapshot) {
    let title = snapshot
        .current_track
        .as_ref()
        .map(|t| t.title.as_str())
        .unwrap_or("nothing");
    println!("{} {} ({})", "Current:".cyan(), title, snapshot.state);
    for (i, track) in snapshot.queue.iter().enumerate() {
        let marker = if Some(i) == snapshot.index { ">" } else { " " };
        println!(" {} {:2}. {}", marker, i + 1, track.title);
    }
}

fn print_header(title: &str) {
    println!("\n{}", title.cyan().bold());
    println!("{}", "=".repeat(50));
}

async fn print_tracks(tracks: &[Track], library: &AppLibrary) {
    if tracks.is_empty() {
        println!("{}", "No songs found".yellow());
        return;
    }

    let liked = library.liked().await;
    for (i, track) in tracks.iter().enumerate() {
        let heart = if liked.iter().any(|l| l.id == track.id) {
            "♥".red().to_string()
        } else {
            " ".to_string()
        };
        println!(
            "{:3}. {} {} - {} {}",
            i + 1,
            heart,
            track.title.green(),
            track.artist_name,
            format!("[{}]", track.id).dimmed()
        );
    }
}
