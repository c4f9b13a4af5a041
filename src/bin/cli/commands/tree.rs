use anyhow::{Context, Result};

use marksync_lib::bookmarks::{count_bookmarks, BookmarkNode};

use crate::app::App;
use crate::OutputFormat;

pub fn run(app: &App, format: &OutputFormat) -> Result<()> {
    let roots = app
        .store
        .snapshot()
        .with_context(|| format!("Failed to load bookmarks from {}", app.store.path().display()))?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&roots)?),
        OutputFormat::Plain => {
            // The untitled root is not printed; its children are the containers.
            let top: Vec<&BookmarkNode> = roots.iter().flat_map(|r| r.children()).collect();
            let total = top.len();
            for (i, node) in top.into_iter().enumerate() {
                print_node(node, "", i + 1 == total);
            }
            println!("\n{} bookmarks", count_bookmarks(&roots));
        }
    }
    Ok(())
}

fn print_node(node: &BookmarkNode, prefix: &str, is_last: bool) {
    let connector = if is_last { "\u{2514}\u{2500}\u{2500} " } else { "\u{251c}\u{2500}\u{2500} " };

    match node {
        BookmarkNode::Leaf(bookmark) => {
            println!("{}{}{}  {}", prefix, connector, bookmark.title, bookmark.url);
        }
        BookmarkNode::Folder(folder) => {
            println!("{}{}{}/", prefix, connector, folder.title);
            let child_prefix = format!("{}{}", prefix, if is_last { "    " } else { "\u{2502}   " });
            let count = folder.children.len();
            for (i, child) in folder.children.iter().enumerate() {
                print_node(child, &child_prefix, i + 1 == count);
            }
        }
    }
}
