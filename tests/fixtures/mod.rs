//! Feed snapshots shared by the integration tests.
#![allow(dead_code)]

use product_reels::models::row::Feed;

pub const HEADERS: &[&str] = &[
    "Job ID",
    "Title",
    "Details",
    "Caption",
    "Posted",
    "Ready",
    "Direct Video URL",
];

/// Build a feed from string literals; short lines are padded.
pub fn feed(headers: &[&str], lines: &[&[&str]]) -> Feed {
    Feed::from_lines(
        headers.iter().map(|h| h.to_string()).collect(),
        lines
            .iter()
            .map(|line| line.iter().map(|v| v.to_string()).collect())
            .collect(),
    )
}

/// Row A has no job id, row B is already posted, row C is ready to go.
pub fn three_row_feed() -> Feed {
    feed(
        HEADERS,
        &[
            &["", "Orphan Mug", "No id", "", "", "TRUE", ""],
            &["J-100", "Trail Mug", "Steel", "", "TRUE", "TRUE", ""],
            &["J-200", "Camp Stove", "Folds flat", "", "", "TRUE", ""],
        ],
    )
}

/// One ready row that carries its own hosted video.
pub fn direct_url_feed() -> Feed {
    feed(
        HEADERS,
        &[&[
            "J-300",
            "Desk Lamp",
            "Warm light",
            "Light up your desk",
            "",
            "yes",
            "https://cdn.example.com/lamp.mp4",
        ]],
    )
}

/// `count` ready rows that need a generated video.
pub fn generation_feed(count: usize) -> Feed {
    let ids: Vec<String> = (1..=count).map(|i| format!("J-{}", i)).collect();
    let titles: Vec<String> = (1..=count).map(|i| format!("Product {}", i)).collect();
    let lines: Vec<Vec<String>> = ids
        .iter()
        .zip(&titles)
        .map(|(id, title)| {
            vec![
                id.clone(),
                title.clone(),
                "Great value".to_string(),
                String::new(),
                String::new(),
                "TRUE".to_string(),
                String::new(),
            ]
        })
        .collect();
    Feed::from_lines(HEADERS.iter().map(|h| h.to_string()).collect(), lines)
}

/// A sheet whose job id column is misnamed, so nothing is accepted.
pub fn misnamed_column_feed() -> Feed {
    feed(
        &["Job Id Number", "Title", "Posted"],
        &[&["J-1", "Mug", ""], &["J-2", "Pan", ""]],
    )
}
