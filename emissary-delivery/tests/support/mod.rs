#![allow(dead_code)]

pub mod stub_mailer;

use std::path::Path;

use emissary_maildir::Maildir;

pub const MESSAGE: &str = "Subject: Hello\n\nHow are you?\n";

pub fn recipients(to: &[&str]) -> Vec<String> {
    to.iter().map(ToString::to_string).collect()
}

pub fn queue(root: &Path) -> Maildir {
    Maildir::open(root.join("queue"), true).expect("queue maildir")
}

pub fn count(maildir: &Maildir, subdir: &str) -> usize {
    std::fs::read_dir(maildir.path().join(subdir))
        .expect("subdir")
        .count()
}
