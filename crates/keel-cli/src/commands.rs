//! CLI command implementations: thin adapters from subcommands onto the
//! client facade, plus the human-readable output.

use keel_client::{KeelClient, Result};
use std::path::Path;

fn open_here() -> Result<KeelClient> {
    KeelClient::open(".")
}

/// Initialize a new repository.
pub fn init(path: Option<&str>) -> Result<()> {
    let dir = path.unwrap_or(".");
    KeelClient::init(dir)?;
    println!(
        "Initialized empty Keel repository in {}",
        Path::new(dir).join(".git").display()
    );
    Ok(())
}

/// Clone a repository.
pub fn clone(url: &str, path: Option<&str>) -> Result<()> {
    let dir = match path {
        Some(dir) => dir.to_string(),
        None => url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or("repository")
            .trim_end_matches(".git")
            .to_string(),
    };
    tracing::info!(url = %url, dir = %dir, "cloning");
    KeelClient::clone(url, &dir)?;
    println!("Cloned into '{}'", dir);
    Ok(())
}

/// Stage files.
pub fn add(paths: &[String]) -> Result<()> {
    let client = open_here()?;
    for path in paths {
        client.add(path)?;
    }
    Ok(())
}

/// Rename a staged file.
pub fn mv(from: &str, to: &str) -> Result<()> {
    open_here()?.mv(from, to)
}

/// Restore files from HEAD.
pub fn restore(paths: &[String]) -> Result<()> {
    let client = open_here()?;
    for path in paths {
        client.restore(path)?;
    }
    Ok(())
}

/// Remove files.
pub fn rm(paths: &[String]) -> Result<()> {
    let client = open_here()?;
    for path in paths {
        client.rm(path)?;
    }
    Ok(())
}

/// Create a commit from the index.
pub fn commit(message: &str) -> Result<()> {
    let client = open_here()?;
    let id = client.commit(message)?;
    let branch = client
        .status()?
        .branch
        .unwrap_or_else(|| "detached HEAD".to_string());
    println!("[{} {}] {}", branch, &id.to_hex()[..7], message);
    Ok(())
}

/// Print the staging status.
pub fn status() -> Result<()> {
    let client = open_here()?;
    let status = client.status()?;
    match &status.branch {
        Some(branch) => println!("On branch {}", branch),
        None => println!("HEAD detached"),
    }
    if status.staged.is_empty() {
        println!("nothing staged");
    } else {
        println!("Staged files:");
        for path in &status.staged {
            println!("\t{}", path);
        }
    }
    Ok(())
}

/// Print the commit history.
pub fn log(limit: Option<usize>) -> Result<()> {
    let client = open_here()?;
    for (id, commit) in client.log(limit)? {
        println!("commit {}", id);
        println!("Author: {} <{}>", commit.author.name, commit.author.email);
        println!();
        for line in commit.message.lines() {
            println!("    {}", line);
        }
        println!();
    }
    Ok(())
}

/// Show a single commit.
pub fn show(revision: Option<&str>) -> Result<()> {
    let client = open_here()?;
    let (id, commit) = client.show(revision.unwrap_or("HEAD"))?;
    println!("commit {}", id);
    println!("tree {}", commit.tree);
    for parent in &commit.parents {
        println!("parent {}", parent);
    }
    println!("Author: {} <{}>", commit.author.name, commit.author.email);
    println!();
    println!("{}", commit.message);
    Ok(())
}

/// List, create, or delete branches.
pub fn branch(name: Option<&str>, delete: bool) -> Result<()> {
    let client = open_here()?;
    match (name, delete) {
        (Some(name), true) => {
            client.delete_branch(name)?;
            println!("Deleted branch {}", name);
        }
        (Some(name), false) => client.create_branch(name)?,
        (None, _) => {
            for (name, _, current) in client.branches()? {
                println!("{} {}", if current { "*" } else { " " }, name);
            }
        }
    }
    Ok(())
}

/// Switch branches.
pub fn switch(branch: &str) -> Result<()> {
    open_here()?.switch(branch)?;
    println!("Switched to branch '{}'", branch);
    Ok(())
}

/// Merge a revision into HEAD.
pub fn merge(revision: &str) -> Result<()> {
    let id = open_here()?.merge(revision)?;
    println!("Merge made commit {}", &id.to_hex()[..7]);
    Ok(())
}

/// Rebase HEAD onto a revision.
pub fn rebase(revision: &str) -> Result<()> {
    let id = open_here()?.rebase(revision)?;
    println!("Successfully rebased; HEAD is now {}", &id.to_hex()[..7]);
    Ok(())
}

/// Reset to a revision.
pub fn reset(revision: &str, hard: bool) -> Result<()> {
    let id = open_here()?.reset(revision, hard)?;
    println!("HEAD is now at {}", &id.to_hex()[..7]);
    Ok(())
}

/// List or create tags.
pub fn tag(name: Option<&str>, message: Option<&str>) -> Result<()> {
    let client = open_here()?;
    match name {
        Some(name) => {
            client.tag(name, message)?;
        }
        None => {
            for (name, _) in client.tags()? {
                println!("{}", name);
            }
        }
    }
    Ok(())
}

/// Fetch a remote.
pub fn fetch(remote: &str) -> Result<()> {
    open_here()?.fetch(remote)
}

/// Fetch and merge.
pub fn pull(remote: &str) -> Result<()> {
    let id = open_here()?.pull(remote)?;
    println!("Updated to {}", &id.to_hex()[..7]);
    Ok(())
}

/// Push a branch.
pub fn push(remote: &str, branch: Option<&str>, force: bool) -> Result<()> {
    let client = open_here()?;
    let id = client.push(remote, branch, force)?;
    println!("Pushed {}", &id.to_hex()[..7]);
    Ok(())
}

/// Add a remote.
pub fn remote_add(name: &str, url: &str) -> Result<()> {
    open_here()?.remote_add(name, url)
}

/// List remotes.
pub fn remote_list() -> Result<()> {
    for (name, url) in open_here()?.remotes()? {
        println!("{}\t{}", name, url);
    }
    Ok(())
}
