use std::sync::Arc;

use comfy_table::{Cell, Table};
use tokio::time::Instant;

use crate::config::Config;
use crate::crawler::Engine;
use crate::error::CrawlifyError;
use crate::storage::models::PageState;
use crate::storage::{SqliteStore, Store};

pub async fn init(config: Config) -> Result<(), CrawlifyError> {
    let store = SqliteStore::new(&config.db_path).await?;
    store.init().await?;
    println!("Database initialized at {}", config.db_path);
    Ok(())
}

pub async fn crawl(
    config: Config,
    seeds: Vec<String>,
    keywords: Option<String>,
    workers: Option<usize>,
    max_pages: Option<usize>,
) -> Result<(), CrawlifyError> {
    let mut config = config;
    if let Some(workers) = workers {
        config.workers = workers;
    }
    if let Some(max_pages) = max_pages {
        config.max_pages_per_worker = max_pages;
    }
    if let Some(raw) = &keywords {
        let parsed = raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        config = config.with_keywords(parsed);
    }

    let store = SqliteStore::new(&config.db_path).await?;
    store.init().await?;

    let mut seed_urls = seeds;
    if seed_urls.is_empty() {
        let scopes = store.get_active_scopes().await?;
        if scopes.is_empty() {
            println!("No seed URLs given and no active scopes found. Nothing to crawl.");
            return Ok(());
        }
        seed_urls = scopes.into_iter().map(|s| s.pattern).collect();
    }

    let engine = Arc::new(Engine::new(config).await?);
    engine.seed(&seed_urls).await?;

    let start = Instant::now();
    engine.run().await?;
    let duration = start.elapsed();

    report(&store).await?;
    println!("Crawl finished in {}", humantime::format_duration(duration));
    Ok(())
}

async fn report(store: &SqliteStore) -> Result<(), CrawlifyError> {
    let mut table = Table::new();
    table.set_header(vec!["State", "Count"]);
    for state in [
        PageState::Html,
        PageState::Binary,
        PageState::Duplicate,
        PageState::Blocked,
        PageState::Frontier,
    ] {
        let count = store.count_pages_in_state(state).await?;
        table.add_row(vec![Cell::new(state.as_str()), Cell::new(count)]);
    }
    println!("{table}");
    Ok(())
}

pub async fn add_scope(config: Config, pattern: String) -> Result<(), CrawlifyError> {
    let store = SqliteStore::new(&config.db_path).await?;
    let id = store.add_scope(&pattern, "DEFAULT", None).await?;
    println!("Added scope {id}: {pattern}");
    Ok(())
}

pub async fn list_scopes(config: Config) -> Result<(), CrawlifyError> {
    let store = SqliteStore::new(&config.db_path).await?;
    let scopes = store.list_scopes().await?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Pattern", "Method", "Active", "Created At"]);
    for scope in scopes {
        table.add_row(vec![
            Cell::new(scope.id),
            Cell::new(scope.pattern),
            Cell::new(scope.method.as_str()),
            Cell::new(if scope.is_active { "Yes" } else { "No" }),
            Cell::new(scope.created_at.to_rfc2822()),
        ]);
    }
    println!("{table}");
    Ok(())
}

pub async fn set_scope(config: Config, id: i64, property: String, value: String) -> Result<(), CrawlifyError> {
    let store = SqliteStore::new(&config.db_path).await?;

    match property.to_lowercase().as_str() {
        "method" => {
            let valid_methods = ["DEFAULT", "NLP", "HEADERS", "CHANGED"];
            let method_upper = value.to_uppercase();
            if !valid_methods.contains(&method_upper.as_str()) {
                println!("Invalid method '{value}'. Valid methods: {}", valid_methods.join(", "));
                return Ok(());
            }
            if store.set_scope_method(id, &method_upper).await? {
                println!("Updated scope {id} method to '{method_upper}'");
            } else {
                println!("No scope found with ID: {id}");
            }
        }
        _ => {
            println!("Unknown property '{property}'. Supported properties: method");
        }
    }
    Ok(())
}

pub async fn remove_scope(config: Config, id: i64) -> Result<(), CrawlifyError> {
    let store = SqliteStore::new(&config.db_path).await?;
    if store.remove_scope(id).await? {
        println!("Removed scope {id}");
    } else {
        println!("No scope found with ID: {id}");
    }
    Ok(())
}
