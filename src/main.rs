use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, Context, bail};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use greenblog::content::embed::render_embeds;
use greenblog::database::models::{PostDraft, PostFilter, TermKind};
use greenblog::utils::config::{self, Settings};
use greenblog::{Blog, BlogError};

#[derive(Parser, Debug)]
#[command(author, version, about = "Blog content store with media housekeeping", long_about = None)]
struct Cli {
    /// Settings file
    #[arg(long, default_value = ".env")]
    env: PathBuf,

    #[arg(short, long)]
    db_path: Option<PathBuf>,

    #[arg(short, long)]
    media_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database, the media directories and a .env file
    Init,
    #[command(subcommand)]
    Category(TermCommand),
    #[command(subcommand)]
    Tag(TermCommand),
    #[command(subcommand)]
    Post(PostCommand),
    #[command(subcommand)]
    Comment(CommentCommand),
    /// Store an image the way the editor upload endpoint does; prints its JSON reply
    Upload { file: PathBuf },
    /// Delete every file in the image directory that no post references
    Sweep,
}

#[derive(Subcommand, Debug)]
enum TermCommand {
    Add { name: String },
    Rename { id: i64, name: String },
    Delete { id: i64 },
    List,
}

#[derive(Args, Debug, Default)]
struct PostFields {
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    slug: Option<String>,
    #[arg(long, conflicts_with = "content_file")]
    content: Option<String>,
    /// Read the HTML body from a file
    #[arg(long)]
    content_file: Option<PathBuf>,
    /// Upload this file as the primary image
    #[arg(long)]
    image: Option<PathBuf>,
    #[arg(long)]
    category: Option<i64>,
    /// Tag id, may be repeated
    #[arg(long = "tag")]
    tags: Vec<i64>,
    #[arg(long)]
    author: Option<String>,
}

#[derive(Subcommand, Debug)]
enum PostCommand {
    Create {
        #[command(flatten)]
        fields: PostFields,
        #[arg(long)]
        publish: bool,
    },
    Edit {
        id: i64,
        #[command(flatten)]
        fields: PostFields,
        #[arg(long, conflicts_with = "image")]
        clear_image: bool,
        #[arg(long)]
        clear_tags: bool,
        #[arg(long, conflicts_with = "unpublish")]
        publish: bool,
        #[arg(long)]
        unpublish: bool,
    },
    Delete { id: i64 },
    /// Print a post as JSON
    Show { slug: String },
    List {
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        tag: Option<String>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        published: bool,
    },
    /// Print a post body with media links turned into embeds
    Render { slug: String },
}

#[derive(Subcommand, Debug)]
enum CommentCommand {
    Add {
        post_id: i64,
        #[arg(long)]
        author: String,
        content: String,
    },
    List { post_id: i64 },
    Delete { id: i64 },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let settings = Settings::load(&cli.env)?
        .with_overrides(cli.db_path.clone(), cli.media_root.clone());
    info!("DB: {:?}, media: {:?}", settings.db_path, settings.media_root);

    run(cli, &settings)
}

fn run(cli: Cli, settings: &Settings) -> Result<()> {
    let mut blog = Blog::open(settings).context("Failed to open blog database")?;

    match cli.command {
        Command::Init => {
            blog.ensure_media_dirs()?;
            if config::save_to_env(&cli.env, settings)? {
                info!("Wrote settings to {:?}", cli.env);
            }
            println!("Initialised {:?} and {:?}", settings.db_path, settings.image_root());
        }
        Command::Category(cmd) => run_term(&blog, TermKind::Category, cmd)?,
        Command::Tag(cmd) => run_term(&blog, TermKind::Tag, cmd)?,
        Command::Post(cmd) => run_post(&mut blog, cmd)?,
        Command::Comment(cmd) => run_comment(&blog, cmd)?,
        Command::Upload { file } => {
            let data = fs::read(&file).with_context(|| format!("Failed to read {:?}", file))?;
            let response = blog.upload_editor_image(&file_name(&file), &data);
            println!("{}", response.to_json());
        }
        Command::Sweep => match blog.sweep_unused_images() {
            Ok(summary) => println!("{}", summary),
            Err(BlogError::MissingMediaDir(dir)) => {
                bail!("Image directory {:?} does not exist; nothing was deleted", dir)
            }
            Err(e) => return Err(e.into()),
        },
    }
    Ok(())
}

fn run_term(blog: &Blog, kind: TermKind, cmd: TermCommand) -> Result<()> {
    match cmd {
        TermCommand::Add { name } => {
            let term = blog.add_term(kind, &name)?;
            println!("{}\t{}\t{}", term.id, term.slug, term.name);
        }
        TermCommand::Rename { id, name } => {
            let term = blog.rename_term(kind, id, &name)?;
            println!("{}\t{}\t{}", term.id, term.slug, term.name);
        }
        TermCommand::Delete { id } => blog.delete_term(kind, id)?,
        TermCommand::List => {
            for term in blog.repo().list_terms(kind)? {
                println!("{}\t{}\t{}", term.id, term.slug, term.name);
            }
        }
    }
    Ok(())
}

fn run_post(blog: &mut Blog, cmd: PostCommand) -> Result<()> {
    match cmd {
        PostCommand::Create { fields, publish } => {
            let image = match &fields.image {
                Some(path) => attach(blog, path)?,
                None => None,
            };
            let draft = PostDraft {
                title: fields.title.clone().context("--title is required")?,
                slug: fields.slug.clone(),
                category_id: fields.category,
                content: read_content(&fields)?.unwrap_or_default(),
                image,
                author: fields.author.clone(),
                published: publish,
                tag_ids: fields.tags.clone(),
            };
            let post = blog.create_post(&draft)?;
            println!("{}\t{}", post.id, post.slug);
        }
        PostCommand::Edit { id, fields, clear_image, clear_tags, publish, unpublish } => {
            let mut post = blog.post(id)?;
            if let Some(title) = &fields.title {
                post.title = title.clone();
            }
            if let Some(slug) = &fields.slug {
                post.slug = slug.clone();
            }
            if let Some(content) = read_content(&fields)? {
                post.content = content;
            }
            if let Some(path) = &fields.image {
                post.image = attach(blog, path)?;
            } else if clear_image {
                post.image = None;
            }
            if fields.category.is_some() {
                post.category_id = fields.category;
            }
            if clear_tags || !fields.tags.is_empty() {
                post.tag_ids = fields.tags.clone();
            }
            if fields.author.is_some() {
                post.author = fields.author.clone();
            }
            if publish {
                post.published = true;
            } else if unpublish {
                post.published = false;
            }

            let (saved, cleanup) = blog.update_post(&post)?;
            println!("{}\t{}", saved.id, saved.slug);
            for name in cleanup.deleted {
                println!("deleted\t{}", name);
            }
        }
        PostCommand::Delete { id } => {
            let (removed, cleanup) = blog.delete_post(id)?;
            println!("Deleted post {} ({})", removed.id, removed.slug);
            for name in cleanup.deleted {
                println!("deleted\t{}", name);
            }
        }
        PostCommand::Show { slug } => {
            let post = blog.post_by_slug(&slug)?;
            println!("{}", serde_json::to_string_pretty(&post)?);
        }
        PostCommand::List { category, tag, search, published } => {
            let filter = PostFilter { category, tag, search, published_only: published };
            for post in blog.posts(&filter)? {
                let flag = if post.published { "published" } else { "draft" };
                println!("{}\t{}\t{}\t{}", post.id, post.slug, flag, post.title);
            }
        }
        PostCommand::Render { slug } => {
            let post = blog.post_by_slug(&slug)?;
            println!("{}", render_embeds(&post.content));
        }
    }
    Ok(())
}

fn run_comment(blog: &Blog, cmd: CommentCommand) -> Result<()> {
    match cmd {
        CommentCommand::Add { post_id, author, content } => {
            let comment = blog.add_comment(post_id, &author, &content)?;
            println!("{}", comment.id);
        }
        CommentCommand::List { post_id } => {
            for c in blog.comments(post_id)? {
                println!("{}\t{}\t{}\t{}", c.id, c.created_at.to_rfc3339(), c.author, c.content);
            }
        }
        CommentCommand::Delete { id } => blog.delete_comment(id)?,
    }
    Ok(())
}

fn attach(blog: &Blog, path: &Path) -> Result<Option<String>> {
    let data = fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    let stored = blog.attach_primary_image(&file_name(path), &data)?;
    if stored.is_none() {
        warn!("Image {:?} could not be processed; saving without it", path);
    }
    Ok(stored)
}

fn read_content(fields: &PostFields) -> Result<Option<String>> {
    if let Some(path) = &fields.content_file {
        let html = fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        return Ok(Some(html));
    }
    Ok(fields.content.clone())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string())
}
