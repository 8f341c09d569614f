//! Header-driven parsing of account rows pasted into the start request.
//! Comma or tab delimited; `username` and `password` columns are required,
//! everything else feeds the per-workflow payloads.

use std::collections::HashMap;

use thiserror::Error;

use drover_types::{Account, PostKind, PostSpec, SetupProfile};

#[derive(Debug, Error)]
pub enum AccountParseError {
    #[error("account data is empty")]
    Empty,
    #[error("missing required column: {0}")]
    MissingColumn(&'static str),
    #[error("row {row}: missing value for {field}")]
    MissingField { row: usize, field: &'static str },
    #[error("row {row}: unknown post type {value:?} (expected video or image)")]
    BadPostType { row: usize, value: String },
}

fn split_row(line: &str, delimiter: char) -> Vec<String> {
    line.split(delimiter).map(|cell| cell.trim().to_string()).collect()
}

fn cell<'a>(
    columns: &HashMap<String, usize>,
    row: &'a [String],
    name: &str,
) -> Option<&'a str> {
    columns
        .get(name)
        .and_then(|&idx| row.get(idx))
        .map(|s| s.as_str())
        .filter(|s| !s.is_empty())
}

fn parse_post(
    columns: &HashMap<String, usize>,
    row: &[String],
    row_no: usize,
    prefix: &str,
) -> Result<Option<PostSpec>, AccountParseError> {
    let type_col = format!("{prefix}_type");
    let desc_col = format!("{prefix}_description");
    let media_col = format!("{prefix}_media");

    let kind = match cell(columns, row, &type_col) {
        Some("video") => PostKind::Video,
        Some("image") => PostKind::Image,
        Some(other) => {
            return Err(AccountParseError::BadPostType {
                row: row_no,
                value: other.to_string(),
            })
        }
        None => return Ok(None),
    };
    let media_urls = cell(columns, row, &media_col)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();
    Ok(Some(PostSpec {
        kind,
        description: cell(columns, row, &desc_col).unwrap_or_default().to_string(),
        media_urls,
    }))
}

pub fn parse_account_rows(text: &str) -> Result<Vec<Account>, AccountParseError> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header = lines.next().ok_or(AccountParseError::Empty)?;
    let delimiter = if header.contains('\t') { '\t' } else { ',' };

    let columns: HashMap<String, usize> = split_row(header, delimiter)
        .into_iter()
        .enumerate()
        .map(|(idx, name)| (name.to_lowercase(), idx))
        .collect();
    for required in ["username", "password"] {
        if !columns.contains_key(required) {
            return Err(AccountParseError::MissingColumn(required));
        }
    }

    let mut accounts = Vec::new();
    for (offset, line) in lines.enumerate() {
        let row_no = offset + 2; // 1-based, after the header
        let row = split_row(line, delimiter);

        let username = cell(&columns, &row, "username").ok_or(AccountParseError::MissingField {
            row: row_no,
            field: "username",
        })?;
        let password = cell(&columns, &row, "password").ok_or(AccountParseError::MissingField {
            row: row_no,
            field: "password",
        })?;

        let mut posts = Vec::new();
        for prefix in ["post1", "post2"] {
            if let Some(post) = parse_post(&columns, &row, row_no, prefix)? {
                posts.push(post);
            }
        }

        let setup = {
            let profile = SetupProfile {
                new_username: cell(&columns, &row, "new_username").map(String::from),
                new_display_name: cell(&columns, &row, "new_display_name").map(String::from),
                bio: cell(&columns, &row, "bio").map(String::from),
                profile_picture_url: cell(&columns, &row, "profile_picture_url").map(String::from),
                posts: posts.clone(),
                highlight_title: cell(&columns, &row, "highlight_title").map(String::from),
                highlight_cover_url: cell(&columns, &row, "highlight_cover_url").map(String::from),
            };
            let has_profile_data = profile.new_username.is_some()
                || profile.new_display_name.is_some()
                || profile.bio.is_some()
                || profile.profile_picture_url.is_some()
                || profile.highlight_title.is_some()
                || !profile.posts.is_empty();
            has_profile_data.then_some(profile)
        };

        accounts.push(Account {
            username: username.to_string(),
            password: password.to_string(),
            posts,
            setup,
        });
    }
    Ok(accounts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_csv_parses_credentials() {
        let accounts = parse_account_rows("username,password\nalice,pw1\nbob,pw2\n").unwrap();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].username, "alice");
        assert_eq!(accounts[1].password, "pw2");
        assert!(accounts[0].setup.is_none());
    }

    #[test]
    fn tab_delimited_with_post_columns() {
        let text = "username\tpassword\tpost1_type\tpost1_description\tpost1_media\n\
                    alice\tpw\tvideo\tfirst reel\thttps://x/a.mp4,https://x/b.mp4\n";
        let accounts = parse_account_rows(text).unwrap();
        let post = &accounts[0].posts[0];
        assert_eq!(post.kind, PostKind::Video);
        assert_eq!(post.description, "first reel");
        assert_eq!(post.media_urls, vec!["https://x/a.mp4", "https://x/b.mp4"]);
    }

    #[test]
    fn setup_columns_build_a_profile() {
        let text = "username,password,new_username,new_display_name,bio\n\
                    alice,pw,sallyroe,Sally Roe,hello there\n";
        let accounts = parse_account_rows(text).unwrap();
        let setup = accounts[0].setup.as_ref().unwrap();
        assert_eq!(setup.new_username.as_deref(), Some("sallyroe"));
        assert_eq!(setup.new_display_name.as_deref(), Some("Sally Roe"));
        assert_eq!(setup.bio.as_deref(), Some("hello there"));
        assert!(setup.profile_picture_url.is_none());
    }

    #[test]
    fn missing_password_column_is_rejected() {
        assert!(matches!(
            parse_account_rows("username\nalice\n"),
            Err(AccountParseError::MissingColumn("password"))
        ));
    }

    #[test]
    fn blank_required_cell_names_the_row() {
        let err = parse_account_rows("username,password\nalice,pw\n,pw2\n").unwrap_err();
        assert!(matches!(
            err,
            AccountParseError::MissingField { row: 3, field: "username" }
        ));
    }

    #[test]
    fn unknown_post_type_is_rejected() {
        let err =
            parse_account_rows("username,password,post1_type\nalice,pw,reel\n").unwrap_err();
        assert!(matches!(err, AccountParseError::BadPostType { row: 2, .. }));
    }
}
