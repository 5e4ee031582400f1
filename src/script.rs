use crate::logw;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::Path;
use tokio::fs;
use walkdir::WalkDir;

pub const DEFAULT_LANGUAGE: &str = "en";

/// One narration script. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub id: String,
    pub body: String,
    pub language: String,
    pub channel_code: Option<String>,
    pub image_query: Option<String>,
}

impl Script {
    pub fn new(id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            body: body.into(),
            language: DEFAULT_LANGUAGE.to_string(),
            channel_code: None,
            image_query: None,
        }
    }

    pub fn paragraphs(&self) -> Vec<String> {
        paragraphs(&self.body)
    }
}

/// Splits on blank lines. Falls back to the whole (trimmed) text so the
/// result always has at least one entry.
pub fn paragraphs(text: &str) -> Vec<String> {
    let mut paras = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paras.push(current.join("\n").trim().to_string());
                current.clear();
            }
            continue;
        }
        current.push(line);
    }
    if !current.is_empty() {
        paras.push(current.join("\n").trim().to_string());
    }

    if paras.is_empty() {
        vec![text.trim().to_string()]
    } else {
        paras
    }
}

/// Restricts an id to characters that are safe as a single file name.
/// Separators and other punctuation become `_`; leading and trailing dots
/// are dropped so the id can never name `.` or `..`.
pub fn sanitize_id(raw: &str) -> Option<String> {
    let mapped: String = raw
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let id = mapped.trim().trim_matches('.').trim();
    if id.is_empty() { None } else { Some(id.to_string()) }
}

/// Parses `---` delimited `key: value` front matter. Unknown keys are ignored.
pub fn parse_script_file(default_id: &str, content: &str) -> Script {
    let content = content.trim_start_matches('\u{feff}');
    let default_id = sanitize_id(default_id).unwrap_or_else(|| "script".to_string());
    let mut script = Script::new(default_id.clone(), content.trim());

    if content.lines().next().map(str::trim) != Some("---") {
        return script;
    }

    let mut consumed = 0usize;
    let mut closed = false;
    for line in content.split_inclusive('\n').skip(1) {
        consumed += line.len();
        let trimmed = line.trim();
        if trimmed == "---" {
            closed = true;
            break;
        }
        let Some((key, value)) = trimmed.split_once(':') else {
            continue;
        };
        let value = value.trim().trim_matches('"').trim_matches('\'').trim();
        if value.is_empty() {
            continue;
        }
        match key.trim().to_ascii_lowercase().as_str() {
            "id" => match sanitize_id(value) {
                Some(id) => script.id = id,
                None => logw(format!("Ignoring unusable script id {value:?}; using {default_id}")),
            },
            "language" | "lang" => script.language = value.to_ascii_lowercase(),
            "channel_code" | "channel" => script.channel_code = Some(value.to_string()),
            "image_query" => script.image_query = Some(value.to_string()),
            _ => {}
        }
    }

    if !closed {
        return Script::new(default_id, content.trim());
    }

    let header_len = content.split_inclusive('\n').next().map(str::len).unwrap_or(0);
    script.body = content[header_len + consumed..].trim().to_string();
    script
}

/// Loads every `.txt` / `.md` script below `dir`, sorted by path.
pub async fn load_script_dir(dir: &Path) -> Result<Vec<Script>> {
    if !fs::metadata(dir).await.map(|m| m.is_dir()).unwrap_or(false) {
        return Ok(Vec::new());
    }

    let mut paths = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("walk scripts dir: {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let ext = entry
            .path()
            .extension()
            .and_then(OsStr::to_str)
            .map(str::to_ascii_lowercase);
        if matches!(ext.as_deref(), Some("txt") | Some("md")) {
            paths.push(entry.into_path());
        }
    }

    let mut scripts = Vec::with_capacity(paths.len());
    for path in paths {
        let stem = path
            .file_stem()
            .and_then(OsStr::to_str)
            .unwrap_or("script")
            .to_string();
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("read script: {}", path.display()))?;
        scripts.push(parse_script_file(&stem, &content));
    }
    Ok(scripts)
}

/// Loads a CSV sheet: header row, then `id,text[,language,channel_code,image_query]`.
pub async fn load_script_csv(path: &Path) -> Result<Vec<Script>> {
    if fs::metadata(path).await.is_err() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("read scripts csv: {}", path.display()))?;
    Ok(parse_script_csv(&content))
}

pub fn parse_script_csv(content: &str) -> Vec<Script> {
    let mut out = Vec::new();
    for (row_idx, row) in parse_csv_rows(content).into_iter().enumerate() {
        if row_idx == 0 {
            continue;
        }
        let field = |i: usize| row.get(i).map(|s| s.trim()).filter(|s| !s.is_empty());
        let (Some(id), Some(text)) = (field(0), field(1)) else {
            if row.iter().any(|f| !f.trim().is_empty()) {
                logw(format!("Skipping CSV row {} (needs id and text)", row_idx + 1));
            }
            continue;
        };

        let Some(id) = sanitize_id(id) else {
            logw(format!("Skipping CSV row {} (unusable id {id:?})", row_idx + 1));
            continue;
        };

        let mut script = Script::new(id, text);
        if let Some(lang) = field(2) {
            script.language = lang.to_ascii_lowercase();
        }
        script.channel_code = field(3).map(str::to_string);
        script.image_query = field(4).map(str::to_string);
        out.push(script);
    }
    out
}

fn parse_csv_rows(content: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = content.trim_start_matches('\u{feff}').chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(ch),
            }
            continue;
        }
        match ch {
            '"' => in_quotes = true,
            ',' => row.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            _ => field.push(ch),
        }
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    rows
}

/// Folder scripts first, then CSV rows. Later duplicates of an id are dropped.
pub async fn load_scripts(dir: &Path, csv: &Path) -> Result<Vec<Script>> {
    let mut all = load_script_dir(dir).await?;
    all.extend(load_script_csv(csv).await?);

    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(all.len());
    for script in all {
        if !seen.insert(script.id.clone()) {
            logw(format!("Duplicate script id {}; keeping the first one", script.id));
            continue;
        }
        out.push(script);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paragraphs_split_on_blank_lines() {
        let p = paragraphs("First line.\nstill first.\n\n  \nSecond.\n\n\nThird.");
        assert_eq!(p, vec!["First line.\nstill first.", "Second.", "Third."]);
    }

    #[test]
    fn paragraphs_fall_back_to_whole_text() {
        assert_eq!(paragraphs("   "), vec![String::new()]);
        assert_eq!(paragraphs("only one"), vec!["only one"]);
    }

    #[test]
    fn front_matter_fills_metadata() {
        let text = "---\nid: hm-001\nlanguage: HI\nchannel_code: HM-Stories\nimage_query: \"desert dunes\"\n---\n\nBody here.\n\nMore.";
        let script = parse_script_file("file-stem", text);
        assert_eq!(script.id, "hm-001");
        assert_eq!(script.language, "hi");
        assert_eq!(script.channel_code.as_deref(), Some("HM-Stories"));
        assert_eq!(script.image_query.as_deref(), Some("desert dunes"));
        assert_eq!(script.body, "Body here.\n\nMore.");
    }

    #[test]
    fn missing_front_matter_uses_stem_and_defaults() {
        let script = parse_script_file("episode-7", "Just text.");
        assert_eq!(script.id, "episode-7");
        assert_eq!(script.language, DEFAULT_LANGUAGE);
        assert!(script.channel_code.is_none());
        assert_eq!(script.body, "Just text.");
    }

    #[test]
    fn unterminated_front_matter_is_treated_as_body() {
        let script = parse_script_file("x", "---\nid: y\nno closing");
        assert_eq!(script.id, "x");
        assert!(script.body.starts_with("---"));
    }

    #[test]
    fn csv_handles_quotes_and_optional_columns() {
        let csv = "id,text,language,channel_code,image_query\n\
                   s1,\"Hello, world.\n\nSecond \"\"para\"\".\",en,MJ-01,\n\
                   s2,Plain,,,\n\
                   ,missing id\n";
        let scripts = parse_script_csv(csv);
        assert_eq!(scripts.len(), 2);
        assert_eq!(scripts[0].id, "s1");
        assert_eq!(scripts[0].body, "Hello, world.\n\nSecond \"para\".");
        assert_eq!(scripts[0].channel_code.as_deref(), Some("MJ-01"));
        assert!(scripts[0].image_query.is_none());
        assert_eq!(scripts[1].language, DEFAULT_LANGUAGE);
    }

    #[test]
    fn ids_cannot_escape_the_output_directory() {
        assert_eq!(sanitize_id("ep/1").as_deref(), Some("ep_1"));
        assert_eq!(sanitize_id("../x").as_deref(), Some("_x"));
        assert_eq!(sanitize_id("a\\b:c").as_deref(), Some("a_b_c"));
        assert_eq!(sanitize_id(" Episode 7 ").as_deref(), Some("Episode 7"));
        assert_eq!(sanitize_id(".."), None);
        assert_eq!(sanitize_id(""), None);

        let script = parse_script_file("stem", "---\nid: ../../etc/passwd\n---\nBody");
        assert_eq!(script.id, "_.._etc_passwd");
        let script = parse_script_file("stem", "---\nid: ..\n---\nBody");
        assert_eq!(script.id, "stem");

        let scripts = parse_script_csv("id,text\n../evil,Body\n..,Dropped\nok,Fine\n");
        let ids: Vec<_> = scripts.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["_evil", "ok"]);
    }

    #[tokio::test]
    async fn loads_folder_and_csv_without_duplicate_ids() {
        let dir = tempfile::tempdir().unwrap();
        let scripts_dir = dir.path().join("scripts");
        std::fs::create_dir_all(&scripts_dir).unwrap();
        std::fs::write(scripts_dir.join("b.txt"), "Second file").unwrap();
        std::fs::write(scripts_dir.join("a.md"), "---\nid: alpha\n---\nFirst").unwrap();
        std::fs::write(scripts_dir.join("ignore.json"), "{}").unwrap();
        let csv = dir.path().join("scripts.csv");
        std::fs::write(&csv, "id,text\nalpha,dup\ngamma,Third\n").unwrap();

        let scripts = load_scripts(&scripts_dir, &csv).await.unwrap();
        let ids: Vec<_> = scripts.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "b", "gamma"]);
        assert_eq!(scripts[0].body, "First");
    }

    #[tokio::test]
    async fn missing_inputs_yield_no_scripts() {
        let dir = tempfile::tempdir().unwrap();
        let scripts = load_scripts(&dir.path().join("nope"), &dir.path().join("nope.csv"))
            .await
            .unwrap();
        assert!(scripts.is_empty());
    }
}
