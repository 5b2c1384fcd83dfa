//! Profile discovery command

use anyhow::Result;

use crate::config::ClientConfig;
use crate::discovery::PageSlot;

use super::{open_session, print_warning};

/// Run the discover command
pub async fn run(config: ClientConfig, search: Option<&str>, page: usize) -> Result<()> {
    let session = open_session(config).await?;
    let mut feed = session.discovery_feed();

    if feed.load_more().await.is_err() {
        if let Some(notice) = feed.notice() {
            print_warning(notice);
        }
        return Ok(());
    }

    if let Some(query) = search {
        feed.search(query);
    }

    // Walk forward so each reached last page can pull in the next batch
    while feed.page() < page {
        let before = (feed.page(), feed.total_pages());
        feed.go_to_page(feed.page() + 1).await;
        if (feed.page(), feed.total_pages()) == before {
            break;
        }
    }

    println!();
    let profiles = feed.current_page_profiles();
    if profiles.is_empty() {
        match feed.query() {
            "" => println!("No profiles yet."),
            query => println!("No profiles match '{}'.", query),
        }
    }
    for profile in profiles {
        println!("@{:<20} {}", profile.username, profile.display_name);
        if let Some(bio) = &profile.bio {
            println!("  {}", bio);
        }
    }

    let window: Vec<String> = feed
        .page_window()
        .into_iter()
        .map(|slot| match slot {
            PageSlot::Page(n) if n == feed.page() => format!("[{}]", n),
            PageSlot::Page(n) => n.to_string(),
            PageSlot::Ellipsis => "...".to_string(),
        })
        .collect();
    if !window.is_empty() {
        println!();
        println!("Pages: {}", window.join(" "));
    }
    if feed.has_more() {
        println!("More profiles are available on the registry.");
    }
    if let Some(notice) = feed.notice() {
        print_warning(notice);
    }

    Ok(())
}
