//! Unit tests for file procedure matching.

use std::fs::{self, File};
use std::path::Path;

use rstest::{fixture, rstest};
use tempfile::TempDir;
use url::Url;

use super::magic::{self, MagicSource, check_rules};
use super::*;

#[fixture]
fn workspace() -> TempDir {
    tempfile::tempdir().expect("create temp dir")
}

struct Handler {
    def: FileHandlerDef,
}

impl Handler {
    fn load(procedure: &str) -> Self {
        Self {
            def: FileHandlerDef::new(procedure, FileHandlerKind::Load),
        }
    }

    fn extensions(mut self, extensions: &[&str]) -> Self {
        self.def.extensions = extensions.iter().map(|e| (*e).to_owned()).collect();
        self
    }

    fn prefixes(mut self, prefixes: &[&str]) -> Self {
        self.def.prefixes = prefixes.iter().map(|p| (*p).to_owned()).collect();
        self
    }

    fn magics(mut self, magics: &str) -> Self {
        self.def.magics = Some(magics.to_owned());
        self
    }

    fn mime_types(mut self, mime_types: &[&str]) -> Self {
        self.def.mime_types = mime_types.iter().map(|m| (*m).to_owned()).collect();
        self
    }

    const fn priority(mut self, priority: i32) -> Self {
        self.def.priority = priority;
        self
    }

    fn build(self) -> FileProcedure {
        FileProcedure::from_def(&self.def).expect("valid handler")
    }
}

fn file_url(dir: &Path, name: &str, contents: &[u8]) -> Url {
    let path = dir.join(name);
    fs::write(&path, contents).expect("write file");
    Url::from_file_path(&path).expect("absolute path")
}

fn found(candidates: &[FileProcedure], url: &Url) -> String {
    find(candidates, url)
        .map(|procedure| procedure.procedure().to_owned())
        .unwrap_or_else(|err| format!("error: {err}"))
}

fn score(rules: &str, contents: &[u8], workspace: &TempDir) -> MagicMatch {
    let path = workspace.path().join("probe");
    fs::write(&path, contents).expect("write file");
    let rules = parse_magics(rules).expect("valid rules");
    let mut source = MagicSource::open(File::open(&path).expect("open")).expect("head");
    check_rules(&rules, &mut source)
}

// ---------------------------------------------------------------------------
// Name matching
// ---------------------------------------------------------------------------

#[test]
fn extension_match_ignores_case() {
    let candidates = vec![Handler::load("file-png-load").extensions(&["png"]).build()];
    let url = Url::parse("file:///photos/holiday.PNG").expect("url");
    assert_eq!(found(&candidates, &url), "file-png-load");
}

#[test]
fn prefix_pass_runs_before_extension_pass() {
    let candidates = vec![
        Handler::load("file-png-load").extensions(&["png"]).build(),
        Handler::load("file-uri-load").prefixes(&["http:"]).priority(50).build(),
    ];
    let url = Url::parse("http://example.com/pic.png").expect("url");
    assert_eq!(found(&candidates, &url), "file-uri-load");
}

#[test]
fn lower_priority_value_wins_and_ties_keep_order() {
    let candidates = vec![
        Handler::load("late").extensions(&["jpg"]).priority(10).build(),
        Handler::load("first").extensions(&["jpg"]).build(),
        Handler::load("second").extensions(&["jpg"]).build(),
    ];
    let url = Url::parse("file:///a/b.jpg").expect("url");
    assert_eq!(found(&candidates, &url), "first");
}

#[rstest]
fn cheap_pass_skips_magic_candidates(workspace: TempDir) {
    let candidates = vec![
        Handler::load("with-magic").extensions(&["dat"]).magics("0,string,NOPE").build(),
        Handler::load("plain").extensions(&["dat"]).priority(5).build(),
    ];
    let url = file_url(workspace.path(), "x.dat", b"some data");
    assert_eq!(found(&candidates, &url), "plain");
}

#[rstest]
fn name_fallback_includes_magic_candidates(workspace: TempDir) {
    let candidates = vec![Handler::load("raw-load").extensions(&["raw"]).magics("0,string,RAW!").build()];
    let url = file_url(workspace.path(), "shot.raw", b"not raw at all");
    assert_eq!(found(&candidates, &url), "raw-load");
}

#[test]
fn unknown_file_type_when_nothing_matches() {
    let candidates = vec![Handler::load("file-png-load").extensions(&["png"]).build()];
    let url = Url::parse("file:///a/b.xcf").expect("url");
    let error = find(&candidates, &url).expect_err("no match");
    assert!(matches!(error, FileProcedureError::UnknownFileType { .. }));
}

#[test]
fn mime_type_lookup_ignores_case() {
    let candidates = vec![
        Handler::load("file-png-load").mime_types(&["image/png"]).build(),
        Handler::load("file-jpeg-load").mime_types(&["image/jpeg"]).build(),
    ];
    let hit = find_by_mime_type(&candidates, "IMAGE/JPEG").map(FileProcedure::procedure);
    assert_eq!(hit, Some("file-jpeg-load"));
    assert!(find_by_mime_type(&candidates, "image/gif").is_none());
}

#[test]
fn prefix_and_extension_lookups_are_exposed() {
    let candidates = vec![
        Handler::load("remote").prefixes(&["ftp:"]).build(),
        Handler::load("tiff").extensions(&["tif", "tiff"]).build(),
    ];
    let ftp = Url::parse("ftp://host/scan.tiff").expect("url");
    assert_eq!(
        find_by_prefix(&candidates, &ftp).map(FileProcedure::procedure),
        Some("remote")
    );
    assert_eq!(
        find_by_extension(&candidates, &ftp).map(FileProcedure::procedure),
        Some("tiff")
    );
}

// ---------------------------------------------------------------------------
// Magic matching
// ---------------------------------------------------------------------------

#[rstest]
fn magic_identifies_misnamed_files(workspace: TempDir) {
    let candidates = vec![
        Handler::load("file-gif-load").extensions(&["gif"]).magics("0,string,GIF8").build(),
        Handler::load("file-png-load").extensions(&["png"]).magics("0,string,\\x89PNG").build(),
    ];
    let url = file_url(workspace.path(), "picture.dat", b"\x89PNG\r\n\x1a\n");
    assert_eq!(found(&candidates, &url), "file-png-load");
}

#[rstest]
fn longest_match_wins_and_ties_go_to_first(workspace: TempDir) {
    let candidates = vec![
        Handler::load("gif-short").magics("0,string,GIF8").build(),
        Handler::load("gif-long").magics("0,string,GIF89a").build(),
        Handler::load("gif-long-again").magics("0,string,GIF89a").build(),
    ];
    let url = file_url(workspace.path(), "anim", b"GIF89a....");
    assert_eq!(found(&candidates, &url), "gif-long");
}

#[rstest]
fn single_size_match_wins_without_real_match(workspace: TempDir) {
    let candidates = vec![
        Handler::load("sized").magics("0,size,>8").build(),
        Handler::load("never").magics("0,string,ZZZZ").build(),
    ];
    let url = file_url(workspace.path(), "blob", b"0123456789");
    assert_eq!(found(&candidates, &url), "sized");
}

#[rstest]
fn ambiguous_size_matches_are_ignored(workspace: TempDir) {
    let candidates = vec![
        Handler::load("sized-a").magics("0,size,>8").build(),
        Handler::load("sized-b").magics("0,size,<100").build(),
    ];
    let url = file_url(workspace.path(), "blob", b"0123456789");
    assert!(found(&candidates, &url).starts_with("error:"));
}

#[rstest]
fn short_files_skip_magic(workspace: TempDir) {
    let candidates = vec![Handler::load("tiny").magics("0,string,ab").build()];
    let url = file_url(workspace.path(), "tiny", b"abc");
    assert!(found(&candidates, &url).starts_with("error:"));
}

#[test]
fn remote_urls_skip_magic() {
    let candidates = vec![Handler::load("png").magics("0,string,\\x89PNG").build()];
    let url = Url::parse("https://example.com/picture").expect("url");
    assert!(found(&candidates, &url).starts_with("error:"));
}

#[rstest]
#[case::string("0,string,GIF8", b"GIF89a", MagicMatch::Bytes(4))]
#[case::byte_masked("0,byte&0xf0,0x40", b"\x4b\x00\x00\x00", MagicMatch::Bytes(1))]
#[case::short("1,short,0x4d4d", b"\x00MM\x00", MagicMatch::Bytes(2))]
#[case::long_negative("-4,long,0x49454e44", b"....data....IEND", MagicMatch::Bytes(4))]
#[case::greater_is_at_least("0,byte,>0x40", b"\x40\x00\x00\x00", MagicMatch::Bytes(1))]
#[case::less_is_strict("0,byte,<0x40", b"\x40\x00\x00\x00", MagicMatch::None)]
#[case::and_group_with_size("0&,string,II,0,size,>4", b"II*\x00\x08", MagicMatch::Bytes(3))]
#[case::failed_and_member("0&,string,II,2,byte,0x2b", b"II*\x00\x08", MagicMatch::None)]
#[case::best_or_group("0,string,MM,0,string,II*", b"II*\x00", MagicMatch::Bytes(3))]
#[case::size_only("0,size,=5", b"12345", MagicMatch::Size)]
#[case::octal_offset("010,byte,0x21", b"........!", MagicMatch::Bytes(1))]
fn rule_scores(
    workspace: TempDir,
    #[case] rules: &str,
    #[case] contents: &[u8],
    #[case] expected: MagicMatch,
) {
    assert_eq!(score(rules, contents, &workspace), expected);
}

#[rstest]
fn values_past_the_head_are_read_from_the_file(workspace: TempDir) {
    let mut contents = vec![b'.'; 400];
    contents.splice(300..304, b"8BPS".iter().copied());
    assert_eq!(
        score("300,string,8BPS", &contents, &workspace),
        MagicMatch::Bytes(4)
    );
}

// ---------------------------------------------------------------------------
// Rule parsing
// ---------------------------------------------------------------------------

#[rstest]
#[case::unknown_type("0,quad,1")]
#[case::incomplete_triple("0,string")]
#[case::bad_offset("x,byte,1")]
#[case::bad_value("0,long,=banana")]
#[case::bad_mask("0,short&zz,1")]
#[case::empty_string("0,string,")]
fn malformed_rules_are_rejected(#[case] rules: &str) {
    let error = parse_magics(rules).expect_err("invalid");
    assert!(matches!(error, FileProcedureError::InvalidMagic { .. }));
}

#[rstest]
#[case("0x1f", Some(31))]
#[case("017", Some(15))]
#[case("-4", Some(-4))]
#[case("0", Some(0))]
#[case("12ab", None)]
fn numbers_follow_c_literal_syntax(#[case] text: &str, #[case] expected: Option<i64>) {
    assert_eq!(magic::parse_number(text), expected);
}

#[test]
fn string_values_decode_c_escapes() {
    assert_eq!(
        magic::unescape("\\n\\101\\x41\\\\\\t"),
        vec![b'\n', b'A', b'A', b'\\', b'\t']
    );
}
