use dropgate::sanitize::{extension_allowed, sanitize_rel_path, slugify};

#[test]
fn slugify_collapses_symbol_runs() {
    assert_eq!(slugify("ACME Corp!! Q3 / Review"), "acme-corp-q3-review");
    assert_eq!(slugify("  spaced  out  "), "spaced-out");
    assert_eq!(slugify("simple"), "simple");
}

#[test]
fn slugify_drops_leading_and_trailing_symbols() {
    assert_eq!(slugify("--hello--"), "hello");
    assert_eq!(slugify("!!!"), "");
    assert_eq!(slugify(""), "");
}

#[test]
fn slugify_caps_at_sixty_four_characters() {
    let long = "x".repeat(100);
    assert_eq!(slugify(&long).len(), 64);
}

#[test]
fn traversal_segments_are_dropped() {
    assert_eq!(sanitize_rel_path("../../etc/passwd"), "etc/passwd");
    assert_eq!(sanitize_rel_path("..\\..\\windows\\system32"), "windows/system32");
    assert_eq!(sanitize_rel_path("a/./b/../c"), "a/b/c");
}

#[test]
fn slashes_collapse_and_backslashes_normalize() {
    assert_eq!(sanitize_rel_path("a//b///c"), "a/b/c");
    assert_eq!(sanitize_rel_path("dir\\file.txt"), "dir/file.txt");
    assert_eq!(sanitize_rel_path("///"), "");
}

#[test]
fn unsafe_characters_become_underscores() {
    assert_eq!(sanitize_rel_path("report (final).pdf"), "report__final_.pdf");
    assert_eq!(sanitize_rel_path("über/naïve.txt"), "_ber/na_ve.txt");
}

#[test]
fn extension_allow_list_is_case_insensitive() {
    let allowed = vec!["pdf".to_owned(), "txt".to_owned()];
    assert!(extension_allowed("report.PDF", &allowed));
    assert!(extension_allowed("notes.txt", &allowed));
    assert!(!extension_allowed("payload.exe", &allowed));
}

#[test]
fn missing_extension_is_always_allowed() {
    let allowed = vec!["pdf".to_owned()];
    assert!(extension_allowed("README", &allowed));
    assert!(extension_allowed("trailing.", &allowed));
}

#[test]
fn dotfiles_count_their_suffix_as_the_extension() {
    let allowed = vec!["pdf".to_owned()];
    assert!(!extension_allowed(".exe", &allowed));
    assert!(!extension_allowed(".phtml", &allowed));
    assert!(extension_allowed(".pdf", &allowed));
}
