use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use dialoguer::{theme::ColorfulTheme, Confirm, Password};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tagdesk::assets::AssetManager;
use tagdesk::config::Config;
use tagdesk::db::{Database, NewUser, Record, Registration, SearchCriteria, UserUpdate};
use tagdesk::export::{self, ExportFormat};
use tagdesk::handlers::{self, EditForm, PhotoChange, PhotoUpload};
use tagdesk::logging;
use tagdesk::pagination::Page;
use tagdesk::session::RequestContext;

/// Catalog search and tagging administration
#[derive(Parser, Debug)]
#[command(name = "tagdesk", version)]
struct Cli {
    /// Path to config file (overrides TAGDESK_CONFIG)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Account to act as; the password is read from TAGDESK_PASSWORD or prompted for
    #[arg(long, short, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search all catalog tables by path text and tags
    Search {
        #[arg(long)]
        path: Option<String>,

        /// Required tag; repeat for several (all must match)
        #[arg(long = "tag")]
        tags: Vec<String>,

        #[arg(long, default_value_t = 1)]
        page: usize,
    },

    /// Browse and edit catalog records
    #[command(subcommand)]
    Records(RecordsCommand),

    /// Manage the tag vocabulary
    #[command(subcommand)]
    Tags(TagsCommand),

    /// Manage accounts
    #[command(subcommand)]
    Users(UsersCommand),

    /// List registered catalog tables with their row counts
    Tables,

    /// Rebuild the record tag index from the stored tag columns
    Reindex,

    /// Delete photo files no record refers to
    PrunePhotos {
        /// Only report what would be deleted
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Args, Debug)]
struct ListingArgs {
    #[arg(long)]
    table: Option<String>,

    #[arg(long)]
    path: Option<String>,

    #[arg(long = "tag")]
    tags: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum RecordsCommand {
    List {
        #[command(flatten)]
        listing: ListingArgs,

        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    Show {
        table: String,
        id: i64,

        /// Print the photo thumbnail as a data URI
        #[arg(long)]
        data_uri: bool,
    },
    Edit {
        table: String,
        id: i64,

        #[arg(long)]
        comment: Option<String>,

        /// Comma-separated tag list replacing the current one
        #[arg(long)]
        tags: Option<String>,

        /// Image file to attach
        #[arg(long, conflicts_with = "clear_photo")]
        photo: Option<PathBuf>,

        #[arg(long)]
        clear_photo: bool,

        /// Fail if the record changed since this version
        #[arg(long)]
        expect_version: Option<i64>,
    },
    Delete {
        table: String,
        id: i64,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    Export {
        #[arg(long)]
        out: PathBuf,

        /// Defaults to the output file extension
        #[arg(long, value_enum)]
        format: Option<ExportFormat>,

        #[command(flatten)]
        listing: ListingArgs,
    },
}

#[derive(Subcommand, Debug)]
enum TagsCommand {
    List,
    Add {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    Edit {
        id: i64,
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    Delete {
        id: i64,
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
enum UsersCommand {
    /// Register an account; the first account needs no login and becomes admin
    Register {
        username: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        admin: bool,
    },
    List,
    Update {
        username: String,
        #[arg(long)]
        rename: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        admin: Option<bool>,
        /// Prompt for a new password
        #[arg(long)]
        password: bool,
    },
    Delete {
        username: String,
        #[arg(long)]
        yes: bool,
    },
}

struct App {
    config: Config,
    db: Database,
    assets: AssetManager,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging (uses journald on Linux, file fallback otherwise)
    let _ = logging::init(Some(Config::config_dir().join("logs")));

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let mut db = Database::open(&config.db_path)
        .with_context(|| format!("Failed to open database {}", config.db_path.display()))?
        .with_hash_cost(config.auth.hash_cost);
    db.initialize()?;
    db.attach_catalog(&config.catalog)
        .context("Catalog configuration does not match the database")?;

    let assets = AssetManager::new(&config.assets);
    let app = App { config, db, assets };
    let ctx = login(&app.db, cli.user.as_deref())?;

    match cli.command {
        Command::Search { path, tags, page } => search(&app, path, tags, page),
        Command::Records(cmd) => records(&app, ctx, cmd),
        Command::Tags(cmd) => tags(&app, &ctx, cmd),
        Command::Users(cmd) => users(&app, &ctx, cmd),
        Command::Tables => {
            ctx.require_admin()?;
            for name in app.db.list_table_names() {
                println!("{:<32} {:>8}", name, app.db.record_count(&name)?);
            }
            Ok(())
        }
        Command::Reindex => {
            ctx.require_admin()?;
            let indexed = app.db.reindex_all_tags()?;
            println!("Indexed {} record tags", indexed);
            Ok(())
        }
        Command::PrunePhotos { dry_run } => {
            ctx.require_admin()?;
            let referenced: HashSet<String> = app.db.photo_refs()?.into_iter().collect();
            let report = app.assets.prune_orphans(&referenced, dry_run)?;
            for photo_ref in &report.removed {
                println!("{}", photo_ref);
            }
            let verb = if dry_run { "Would remove" } else { "Removed" };
            println!("{} {} files ({} bytes)", verb, report.files_removed, report.bytes_freed);
            Ok(())
        }
    }
}

fn login(db: &Database, user: Option<&str>) -> Result<RequestContext> {
    let Some(username) = user else {
        return Ok(RequestContext::anonymous());
    };
    let password = match std::env::var("TAGDESK_PASSWORD") {
        Ok(password) => password,
        Err(_) => prompt_password("Password")?,
    };
    match handlers::login(db, username, &password)? {
        Some(ctx) => Ok(ctx),
        None => bail!("Invalid username or password"),
    }
}

fn prompt_password(prompt: &str) -> Result<String> {
    Password::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .interact()
        .context("Failed to read password")
}

fn confirm(prompt: String, skip: bool) -> Result<bool> {
    if skip {
        return Ok(true);
    }
    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(false)
        .interact()
        .context("Failed to read confirmation")
}

fn split_tag_arg(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn print_record_line(record: &Record) {
    let photo = if record.photo_ref.is_some() { "*" } else { " " };
    println!(
        "{photo} {:>16}#{:<6} {}  [{}]  {}",
        record.source_table,
        record.row_id,
        record.path,
        record.tag_list().join(", "),
        record.comment.as_deref().unwrap_or("")
    );
}

fn print_page(records: &[Record], requested: usize, page_size: usize) {
    let page = Page::of(records, requested, page_size);
    for record in page.items {
        print_record_line(record);
    }
    println!(
        "Page {} of {} ({} records){}{}",
        page.number,
        page.total_pages,
        page.total_items,
        if page.has_prev() { ", --page N-1 for previous" } else { "" },
        if page.has_next() { ", --page N+1 for next" } else { "" },
    );
}

fn search(app: &App, path: Option<String>, tags: Vec<String>, page: usize) -> Result<()> {
    let criteria = SearchCriteria {
        path,
        tags,
    };
    if criteria.is_empty() {
        println!("Give --path and/or --tag to search. Known tags:");
        for name in app.db.tag_names()? {
            println!("  {}", name);
        }
        return Ok(());
    }
    let records = handlers::public_search(&app.db, &criteria)?;
    print_page(&records, page, app.config.listing.page_size);
    Ok(())
}

fn listing_records(app: &App, ctx: &mut RequestContext, listing: ListingArgs) -> Result<Vec<Record>> {
    ctx.listing.set_table(listing.table.as_deref());
    ctx.listing.set_criteria(SearchCriteria {
        path: listing.path,
        tags: listing.tags,
    });

    // Without any filter, take every record of every table
    if ctx.listing.table().is_none() && ctx.listing.criteria().is_empty() {
        ctx.require_admin()?;
        let mut all = Vec::new();
        for name in app.db.list_table_names() {
            all.extend(app.db.get_records(&name, None)?);
        }
        return Ok(all);
    }
    Ok(handlers::admin_listing(ctx, &app.db)?)
}

fn records(app: &App, mut ctx: RequestContext, cmd: RecordsCommand) -> Result<()> {
    match cmd {
        RecordsCommand::List { listing, page } => {
            let records = listing_records(app, &mut ctx, listing)?;
            ctx.listing.set_page(page);
            print_page(&records, ctx.listing.page(), app.config.listing.page_size);
        }
        RecordsCommand::Show { table, id, data_uri } => {
            ctx.require_admin()?;
            let record = app.db.get_record(&table, id)?;
            println!("Table:    {}", record.source_table);
            println!("Row:      {}", record.row_id);
            println!("Path:     {}", record.path);
            println!("Sub-file: {}", record.sub_file.as_deref().unwrap_or("-"));
            println!("Comment:  {}", record.comment.as_deref().unwrap_or("-"));
            println!("Tags:     {}", record.tag_list().join(", "));
            println!("Version:  {}", record.version);
            match &record.photo_ref {
                Some(photo_ref) if app.assets.exists(photo_ref) => {
                    println!("Photo:    {}", photo_ref);
                    if data_uri {
                        let listing = &app.config.listing;
                        match app.assets.thumbnail_data_uri(
                            photo_ref,
                            listing.thumbnail_width,
                            listing.thumbnail_height,
                        ) {
                            Some(uri) => println!("{}", uri),
                            None => println!("(photo cannot be decoded)"),
                        }
                    }
                }
                Some(photo_ref) => println!("Photo:    {} (missing)", photo_ref),
                None => println!("Photo:    -"),
            }
        }
        RecordsCommand::Edit {
            table,
            id,
            comment,
            tags,
            photo,
            clear_photo,
            expect_version,
        } => {
            ctx.require_admin()?;
            let current = app.db.get_record(&table, id)?;

            let upload_bytes = match &photo {
                Some(path) => Some(
                    std::fs::read(path)
                        .with_context(|| format!("Failed to read photo {}", path.display()))?,
                ),
                None => None,
            };
            let file_name = photo
                .as_deref()
                .and_then(Path::file_name)
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let photo_change = match &upload_bytes {
                Some(bytes) => PhotoChange::Replace(PhotoUpload {
                    file_name: &file_name,
                    bytes,
                }),
                None if clear_photo => PhotoChange::Clear,
                None => PhotoChange::Keep,
            };

            let form = EditForm {
                comment: comment.unwrap_or_else(|| current.comment.clone().unwrap_or_default()),
                tags: match tags {
                    Some(raw) => split_tag_arg(&raw),
                    None => current.tag_list(),
                },
                photo: photo_change,
                expected_version: Some(expect_version.unwrap_or(current.version)),
            };
            let record = handlers::edit_record(&ctx, &app.db, &app.assets, &table, id, &form)?;
            print_record_line(&record);
            println!("Saved as version {}", record.version);
        }
        RecordsCommand::Delete { table, id, yes } => {
            ctx.require_admin()?;
            let record = app.db.get_record(&table, id)?;
            if !confirm(format!("Delete {}#{} ({})?", table, id, record.path), yes)? {
                println!("Cancelled.");
                return Ok(());
            }
            handlers::delete_record(&ctx, &app.db, &app.assets, &table, id)?;
            println!("Deleted {}#{}", table, id);
        }
        RecordsCommand::Export {
            out,
            format,
            listing,
        } => {
            let records = listing_records(app, &mut ctx, listing)?;
            let format = format.unwrap_or_else(|| ExportFormat::from_path(&out));
            let out = if out.extension().is_none() {
                out.with_extension(format.extension())
            } else {
                out
            };
            let count = export::export_records(&records, &out, format)?;
            println!("Exported {} records to {}", count, out.display());
        }
    }
    Ok(())
}

fn tags(app: &App, ctx: &RequestContext, cmd: TagsCommand) -> Result<()> {
    match cmd {
        TagsCommand::List => {
            for tag in handlers::list_tags(&app.db)? {
                println!(
                    "{:>5}  {:<24} {}",
                    tag.id,
                    tag.name,
                    tag.description.as_deref().unwrap_or("")
                );
            }
        }
        TagsCommand::Add { name, description } => {
            let id = handlers::create_tag(ctx, &app.db, &name, description.as_deref())?;
            println!("Created tag {} ({})", name.trim(), id);
        }
        TagsCommand::Edit {
            id,
            name,
            description,
        } => {
            handlers::update_tag(ctx, &app.db, id, &name, description.as_deref())?;
            println!("Updated tag {}", id);
        }
        TagsCommand::Delete { id, yes } => {
            ctx.require_admin()?;
            let tag = app.db.get_tag(id)?;
            let prompt = format!("Delete tag {:?}? Records keep their reference to it.", tag.name);
            if !confirm(prompt, yes)? {
                println!("Cancelled.");
                return Ok(());
            }
            handlers::delete_tag(ctx, &app.db, id)?;
            println!("Deleted tag {:?}", tag.name);
        }
    }
    Ok(())
}

fn users(app: &App, ctx: &RequestContext, cmd: UsersCommand) -> Result<()> {
    match cmd {
        UsersCommand::Register {
            username,
            name,
            admin,
        } => {
            let password = prompt_password("New password")?;
            let confirm_password = prompt_password("Repeat password")?;
            let form = Registration {
                user: NewUser {
                    username,
                    password,
                    display_name: name,
                    is_admin: admin,
                },
                confirm_password,
            };
            let username = form.user.username.clone();
            handlers::register_user(ctx, &app.db, form)?;
            println!("Registered {}", username);
        }
        UsersCommand::List => {
            for user in handlers::list_users(ctx, &app.db)? {
                println!(
                    "{:<24} {:<24} {}",
                    user.username,
                    user.display_name.as_deref().unwrap_or(""),
                    if user.is_admin { "admin" } else { "" }
                );
            }
        }
        UsersCommand::Update {
            username,
            rename,
            name,
            admin,
            password,
        } => {
            ctx.require_admin()?;
            let password = if password {
                let first = prompt_password("New password")?;
                if first != prompt_password("Repeat password")? {
                    bail!("Passwords do not match");
                }
                Some(first)
            } else {
                None
            };
            let update = UserUpdate {
                username: rename,
                password,
                display_name: name,
                is_admin: admin,
            };
            handlers::update_user(ctx, &app.db, &username, &update)?;
            println!("Updated {}", username);
        }
        UsersCommand::Delete { username, yes } => {
            ctx.require_admin()?;
            if !confirm(format!("Delete account {:?}?", username), yes)? {
                println!("Cancelled.");
                return Ok(());
            }
            handlers::delete_user(ctx, &app.db, &username)?;
            println!("Deleted {}", username);
        }
    }
    Ok(())
}
