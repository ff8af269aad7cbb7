//! Slugshot CLI application entry point
//!
//! Opens the library named in the configuration, builds the event pipeline
//! and dispatches the parsed command to its handler.
//!
//! # Usage
//!
//! ```bash
//! # Register an image and feature it on a new item
//! slugshot import ~/Pictures/IMG_0042.jpg
//! slugshot item add "Sunset Beach" --status publish --image 1
//!
//! # Rename every eligible featured image
//! slugshot bulk-rename --yes
//!
//! # Turn on WebP siblings
//! slugshot settings set enable_optimization 1
//! slugshot settings set enable_webp_generation 1
//!
//! # Ask the registry for a newer release
//! slugshot update check
//! ```
//!
//! # Configuration
//!
//! On first run, slugshot prompts for the storage root and its public URL.
//! Configuration is stored in the user's config directory
//! (`~/.config/slugshot/config.toml` on Linux).

use colored::Colorize;
use dialoguer::{Confirm, theme::ColorfulTheme};
use std::io::{self, Write};
use std::path::PathBuf;

use slugshot::{
    PLUGIN_FILE, PLUGIN_SLUG, SlugshotError, VERSION,
    bulk::{BulkClient, LocalTransport, RunStatus},
    cli::{Cli, Commands, ItemCommands, NoticesCommands, SettingsCommands, UpdateCommands},
    config::SlugshotConfig,
    endpoints::{Caller, Endpoints, Request, TokenIssuer},
    library::{AttachmentId, ContentItem, ItemId, Library, LibraryError},
    logging,
    options::{Flag, Settings, parse_bool},
    pipeline::{Event, Pipeline, StageReport},
    release::{GithubRegistry, HostInfo, ReleaseCache},
};

type Result<T> = std::result::Result<T, SlugshotError>;

const PROGRESS_WIDTH: usize = 30;

/// Registry lookups cached in memory and in the configured cache file
///
/// # Errors
///
/// Returns `SlugshotError` if the HTTP client cannot be built.
fn release_cache(config: &SlugshotConfig) -> Result<ReleaseCache<GithubRegistry>> {
    let host = HostInfo::from_config(config);
    let registry = GithubRegistry::new(&config.registry, &host.user_agent())?;
    Ok(ReleaseCache::new(
        registry,
        Some(config.registry.cache_file.clone()),
    ))
}

fn find_item(library: &Library, id: u64) -> Result<ContentItem> {
    Ok(library
        .get_item(ItemId(id))?
        .ok_or(LibraryError::ItemNotFound(id))?)
}

fn print_report(report: &StageReport, quiet: bool) {
    if quiet {
        return;
    }
    match report {
        StageReport::Renamed(outcome) if outcome.is_failed() => eprintln!("{} {report}", "✗".red()),
        StageReport::Skipped(_) => println!("{} {report}", "⊘".yellow()),
        _ => println!("{} {report}", "✓".green()),
    }
}

/// Handle the import command - copy files into the storage root
///
/// # Errors
///
/// Returns `SlugshotError` if a file cannot be copied or registered.
fn handle_import_command(pipeline: &Pipeline<'_>, files: &[PathBuf], quiet: bool) -> Result<()> {
    for file in files {
        let attachment = pipeline.import(file)?;
        if quiet {
            println!("{}", attachment.id);
        } else {
            println!(
                "Imported {} as attachment {} ({})",
                file.display(),
                attachment.id.to_string().bold(),
                attachment.relative_file
            );
        }
    }
    Ok(())
}

/// Handle the item command - create, list, show and retitle items
///
/// # Errors
///
/// Returns `SlugshotError` if an item or attachment does not exist or the
/// library cannot be read or written.
fn handle_item_command(pipeline: &Pipeline<'_>, command: &ItemCommands, quiet: bool) -> Result<()> {
    let library = pipeline.library();
    match command {
        ItemCommands::Add { title, status, image } => {
            let mut item = ContentItem::new(ItemId(library.next_id()?), title.as_str(), *status);
            if let Some(image) = image {
                if library.get_attachment(AttachmentId(*image))?.is_none() {
                    return Err(LibraryError::AttachmentNotFound(*image).into());
                }
                item = item.with_featured_image(AttachmentId(*image));
            }
            let report = pipeline.save_item(&item, false, false)?;
            if quiet {
                println!("{}", item.id);
            } else {
                println!("Created item {}", item.id.to_string().bold());
            }
            print_report(&report, quiet);
        }
        ItemCommands::List => {
            let items = library.list_items()?;
            if items.is_empty() {
                if !quiet {
                    println!("No items.");
                }
                return Ok(());
            }
            for item in items {
                let image = item
                    .featured_image
                    .map_or_else(|| "-".dimmed().to_string(), |id| id.to_string());
                if quiet {
                    println!("{}\t{}", item.id, item.title);
                } else {
                    println!("{:>6}  {:<10}  {:>6}  {}", item.id, item.status, image, item.title);
                }
            }
        }
        ItemCommands::Show { id } => {
            let item = find_item(library, *id)?;
            println!("{} {}", "Item".bold(), item.id);
            println!("  Title:  {}", item.title);
            println!("  Status: {}", item.status);

            let Some(attachment_id) = item.featured_image else {
                println!("  Featured image: {}", "none".dimmed());
                return Ok(());
            };
            match library.get_attachment(attachment_id)? {
                Some(attachment) => {
                    println!("  Featured image: {}", attachment.id);
                    println!("    File: {}", attachment.file.display());
                    println!("    GUID: {}", attachment.guid);
                    println!("    Name: {}", attachment.name);
                    println!(
                        "    Size: {}x{}",
                        attachment.metadata.width, attachment.metadata.height
                    );
                    for (name, size) in &attachment.metadata.sizes {
                        println!("      {name}: {} ({}x{})", size.file, size.width, size.height);
                    }
                }
                None => println!("  Featured image: {} (missing)", attachment_id),
            }
        }
        ItemCommands::Retitle { id, title } => {
            let mut item = find_item(library, *id)?;
            item.title.clone_from(title);
            let report = pipeline.save_item(&item, false, false)?;
            print_report(&report, quiet);
        }
    }
    Ok(())
}

/// Handle the bulk-rename command - drive the batch protocol to completion
///
/// # Errors
///
/// Returns `SlugshotError` if the prompt fails or a batch request is rejected.
fn handle_bulk_command(pipeline: &Pipeline<'_>, yes: bool, user: &str, quiet: bool) -> Result<()> {
    let library = pipeline.library();
    if !yes && !quiet {
        let total = library.count_bulk_eligible()?;
        if total == 0 {
            println!("No featured images to rename.");
            return Ok(());
        }
        let proceed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Rename the featured images of {total} item(s)?"))
            .default(false)
            .interact()
            .map_err(|e| SlugshotError::InvalidInput(format!("Failed to read input: {e}")))?;
        if !proceed {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let endpoints = Endpoints::new(pipeline, TokenIssuer::load_or_create(library)?);
    let mut client = BulkClient::new(LocalTransport::new(&endpoints, Caller::manager(user)));
    let status = client.run(|progress| {
        if !quiet && progress.total > 0 {
            eprint!("\r{}", progress.bar(PROGRESS_WIDTH));
            let _ = io::stderr().flush();
        }
    });
    if !quiet {
        eprintln!();
    }

    match status {
        RunStatus::NothingToDo => {
            if !quiet {
                println!("No featured images to rename.");
            }
            Ok(())
        }
        RunStatus::Completed(progress) => {
            if quiet {
                println!("{}", progress.stats_line());
            } else {
                progress.print("Bulk Rename");
            }
            Ok(())
        }
        RunStatus::Failed { progress, error } => {
            if !quiet {
                progress.print("Bulk Rename");
            }
            Err(error.into())
        }
    }
}

/// Handle the update command - consult the release registry
///
/// # Errors
///
/// Returns `SlugshotError` if the pipeline has no release source.
fn handle_update_command(
    pipeline: &Pipeline<'_>,
    cache: &ReleaseCache<GithubRegistry>,
    command: &UpdateCommands,
    quiet: bool,
) -> Result<()> {
    let resolver = pipeline
        .resolver()
        .ok_or_else(|| SlugshotError::InvalidInput("No release source configured".into()))?;

    match command {
        UpdateCommands::Check { refresh } => {
            if *refresh {
                cache.invalidate();
            }
            let report = pipeline.dispatch(Event::UpdateCheck {
                checked: vec![PLUGIN_FILE.to_string()],
            })?;
            match report {
                StageReport::Update(Some(offer)) => {
                    if quiet {
                        println!("{}", offer.new_version);
                    } else {
                        println!(
                            "{} {VERSION} → {}",
                            "Update available:".green().bold(),
                            offer.new_version.bold()
                        );
                        println!("  Package: {}", offer.package);
                        println!("  Requires host {}, tested with {}", offer.requires, offer.tested);
                    }
                }
                StageReport::Update(None) => {
                    if !quiet {
                        match resolver.latest() {
                            Some(_) => println!("{PLUGIN_SLUG} {VERSION} is up to date"),
                            None => println!("{}", "No release information available".yellow()),
                        }
                    }
                }
                other => print_report(&other, quiet),
            }
        }
        UpdateCommands::Info => match resolver.release_info(PLUGIN_SLUG) {
            Some(info) => println!("{}", serde_json::to_string_pretty(&info)?),
            None => {
                if !quiet {
                    println!("{}", "No release information available".yellow());
                }
            }
        },
        UpdateCommands::Auto => {
            println!("{}", resolver.should_auto_update(PLUGIN_SLUG, false));
        }
    }
    Ok(())
}

/// Handle the settings command - read and write option flags
///
/// # Errors
///
/// Returns `SlugshotError` if the key or value is invalid or the option
/// store cannot be written.
fn handle_settings_command(
    library: &Library,
    settings: &Settings,
    command: &SettingsCommands,
    quiet: bool,
) -> Result<()> {
    match command {
        SettingsCommands::Get { key } => {
            let flag: Flag = key.parse()?;
            println!("{}", settings.get(flag));
        }
        SettingsCommands::Set { key, value } => {
            let flag: Flag = key.parse()?;
            let enabled = parse_bool(value).ok_or_else(|| {
                SlugshotError::InvalidInput(format!(
                    "Invalid value for {flag}: '{value}'. Use 1/0, true/false or on/off"
                ))
            })?;
            flag.write(library, enabled)?;
            if !quiet {
                println!("Set {flag} = {enabled}");
            }
        }
        SettingsCommands::List => {
            for flag in Flag::ALL {
                if quiet {
                    println!("{flag}={}", settings.get(flag));
                } else {
                    println!(
                        "{:<32} {:<5}  {}",
                        flag.key(),
                        settings.get(flag),
                        flag.description().dimmed()
                    );
                }
            }
        }
    }
    Ok(())
}

/// Handle the notices command
///
/// # Errors
///
/// Returns `SlugshotError` if the notice tree cannot be read or cleared.
fn handle_notices_command(library: &Library, command: &NoticesCommands, quiet: bool) -> Result<()> {
    match command {
        NoticesCommands::List => {
            let notices = library.list_notices()?;
            if notices.is_empty() && !quiet {
                println!("No notices.");
            }
            for (key, message) in notices {
                println!("{} {message} {}", "⚠".yellow(), format!("[{key}]").dimmed());
            }
        }
        NoticesCommands::Clear => {
            library.clear_notices()?;
            if !quiet {
                println!("Notices cleared.");
            }
        }
    }
    Ok(())
}

/// Handle the serve-request command - dispatch one raw JSON request
///
/// # Errors
///
/// Returns `SlugshotError` if the request cannot be read or parsed.
fn handle_serve_request(endpoints: &Endpoints<'_>, request: Option<&str>, caller: &Caller) -> Result<()> {
    let body = match request {
        Some(body) => body.to_string(),
        None => io::read_to_string(io::stdin())?,
    };
    let request: Request = serde_json::from_str(&body)?;
    let response = endpoints.dispatch(caller, &request);
    println!("{}", serde_json::to_string(&response)?);
    Ok(())
}

/// Main entry point for the slugshot application
///
/// # Errors
///
/// Returns `SlugshotError` if configuration loading fails, the library
/// cannot be opened, or any command handler returns an error.
fn main() -> Result<()> {
    let cli = Cli::parse_args();

    let config = match &cli.config {
        Some(path) => SlugshotConfig::load_from(path)?,
        None => SlugshotConfig::load_or_setup()?,
    };
    let _log_guard = logging::init(&config.logging, cli.verbose)?;

    std::fs::create_dir_all(&config.storage.root)?;
    let library = Library::open(&config.library)?;
    let settings = Settings::load(&library)?;

    let releases = match &cli.command {
        Commands::Update { .. } => Some(release_cache(&config)?),
        _ => None,
    };
    let mut pipeline = Pipeline::new(&library, &config, &settings);
    if let Some(cache) = &releases {
        pipeline = pipeline.with_release_source(cache);
    }
    if settings.webp_enabled() {
        pipeline.variants().verify_capability()?;
    }

    let quiet = cli.quiet;
    match &cli.command {
        Commands::Import { files } => handle_import_command(&pipeline, files, quiet)?,
        Commands::Item { command } => handle_item_command(&pipeline, command, quiet)?,
        Commands::Save {
            id,
            autosave,
            revision,
        } => {
            let item = find_item(&library, *id)?;
            let report = pipeline.dispatch(Event::ContentSaved {
                item: item.id,
                autosave: *autosave,
                revision: *revision,
            })?;
            print_report(&report, quiet);
        }
        Commands::Regenerate { ids } => {
            for id in ids {
                let attachment = pipeline.regenerate(AttachmentId(*id))?;
                if !quiet {
                    println!(
                        "Regenerated attachment {} ({} size(s))",
                        attachment.id,
                        attachment.metadata.sizes.len()
                    );
                }
            }
        }
        Commands::BulkRename { yes, user } => handle_bulk_command(&pipeline, *yes, user, quiet)?,
        Commands::Src { id, url } => {
            let attachment = library
                .get_attachment(AttachmentId(*id))?
                .ok_or(LibraryError::AttachmentNotFound(*id))?;
            let url = url
                .clone()
                .unwrap_or_else(|| config.storage.url_for(&attachment.relative_file));
            println!("{}", pipeline.variants().resolve_src(&attachment, &url));
        }
        Commands::Update { command } => {
            let cache = releases
                .as_ref()
                .ok_or_else(|| SlugshotError::InvalidInput("No release source configured".into()))?;
            handle_update_command(&pipeline, cache, command, quiet)?;
        }
        Commands::Settings { command } => handle_settings_command(&library, &settings, command, quiet)?,
        Commands::Notices { command } => handle_notices_command(&library, command, quiet)?,
        Commands::Token { action, user } => {
            let endpoints = Endpoints::new(&pipeline, TokenIssuer::load_or_create(&library)?);
            println!("{}", endpoints.token_for(action, &Caller::manager(user.as_str()))?);
        }
        Commands::ServeRequest {
            request,
            user,
            unprivileged,
        } => {
            let caller = if *unprivileged {
                Caller {
                    user: user.clone(),
                    capabilities: Vec::new(),
                }
            } else {
                Caller::manager(user.as_str())
            };
            let endpoints = Endpoints::new(&pipeline, TokenIssuer::load_or_create(&library)?);
            handle_serve_request(&endpoints, request.as_deref(), &caller)?;
        }
    }

    library.flush()?;
    Ok(())
}
