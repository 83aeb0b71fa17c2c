use assert_matches::assert_matches;
use patch_engine::{
    apply_blocks, apply_literal, apply_patch, apply_patch_to_file, parse_search_replace,
    PatchBlock, PatchError, PatchRequest,
};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

const PEOPLE_JSON: &str = r#"[
    {
        "name": "John Smith",
        "sex": "M",
        "phone": "+1-555-0101"
    },
    {
        "name": "Emma Wilson",
        "sex": "F",
        "phone": "+1-555-0102"
    }
]"#;

fn line_count(text: &str) -> usize {
    text.split('\n').count()
}

#[test]
fn literal_fragment_inside_a_line_is_replaced_verbatim() {
    let buffer = "[{\"a\":1},\n{\"a\":2}]";

    let outcome =
        apply_literal(buffer, "{\"a\":1},", "{\"a\":1,\"b\":9},").expect("patch applies");

    assert_eq!(outcome.text, "[{\"a\":1,\"b\":9},\n{\"a\":2}]");
    assert!(outcome.exact);
}

#[test]
fn literal_indented_line_replacement() {
    let outcome = apply_literal(
        PEOPLE_JSON,
        "        \"name\": \"John Smith\",",
        "        \"name\": \"John Smith-2\",",
    )
    .expect("patch applies");

    assert_eq!(
        outcome.text,
        PEOPLE_JSON.replace("\"John Smith\"", "\"John Smith-2\"")
    );
}

#[test]
fn reindented_fragment_grows_matched_window() {
    let find = "{\n\"name\": \"John Smith\",\n\"sex\": \"M\",\n\"phone\": \"+1-555-0101\"\n},";
    let replace = "    {\n        \"name\": \"John Smith\",\n        \"sex\": \"M\",\n        \"phone\": \"+1-555-0101\",\n        \"region_id\": 2\n    },";

    let outcome = apply_literal(PEOPLE_JSON, find, replace).expect("fuzzy patch applies");

    let expected = PEOPLE_JSON.replace(
        "        \"phone\": \"+1-555-0101\"\n",
        "        \"phone\": \"+1-555-0101\",\n        \"region_id\": 2\n",
    );
    assert_eq!(outcome.text, expected);
    assert!(!outcome.exact);
    assert_eq!(line_count(&outcome.text), line_count(PEOPLE_JSON) + 1);
}

#[test]
fn shrinking_replacement_removes_surplus_lines() {
    let find = "    {\n  \"name\": \"Emma Wilson\",\n  \"sex\": \"F\",\n  \"phone\": \"+1-555-0102\"";
    let replace = "    {\"name\": \"Emma Wilson\"";

    let outcome = apply_literal(PEOPLE_JSON, find, replace).expect("fuzzy patch applies");

    assert_eq!(line_count(&outcome.text), line_count(PEOPLE_JSON) - 3);
    assert!(outcome
        .text
        .contains("    },\n    {\"name\": \"Emma Wilson\"\n    }\n]"));
}

#[test]
fn one_line_grown_to_four_adds_three_lines() {
    let buffer = "alpha\nbeta\ngamma";
    let outcome = apply_blocks(buffer, &[PatchBlock::new("  beta", "b1\nb2\nb3\nb4")])
        .expect("patch applies");

    assert_eq!(outcome.text, "alpha\nb1\nb2\nb3\nb4\ngamma");
    assert_eq!(line_count(&outcome.text), line_count(buffer) + 3);
}

#[test]
fn identity_replacement_leaves_buffer_byte_identical() {
    let find = "        \"sex\": \"F\",\n        \"phone\": \"+1-555-0102\"";

    let literal = apply_literal(PEOPLE_JSON, find, find).expect("literal applies");
    assert_eq!(literal.text, PEOPLE_JSON);

    let fuzzy = apply_blocks(PEOPLE_JSON, &[PatchBlock::new(find, find)]).expect("fuzzy applies");
    assert_eq!(fuzzy.text, PEOPLE_JSON);
}

#[test]
fn repeated_fragment_is_ambiguous_for_a_single_block() {
    let literal = apply_literal(PEOPLE_JSON, "\"sex\": ", "\"gender\": ");
    assert_matches!(literal, Err(PatchError::AmbiguousMatch { block: 0, count: 2 }));

    // Line blocks match whole lines only.
    let fuzzy = apply_blocks(PEOPLE_JSON, &[PatchBlock::new("\"sex\":", "\"gender\":")]);
    assert_matches!(fuzzy, Err(PatchError::NotFound { block: 0 }));

    let fuzzy = apply_blocks(PEOPLE_JSON, &[PatchBlock::new("{", "{ // person")]);
    assert_matches!(fuzzy, Err(PatchError::AmbiguousMatch { block: 0, count: 2 }));
}

#[test]
fn overlapping_literal_occurrences_are_ambiguous() {
    let outcome = apply_literal("aaa", "aa", "X");

    assert_matches!(outcome, Err(PatchError::AmbiguousMatch { block: 0, count: 2 }));
}

#[test]
fn blank_edged_search_and_replace_keep_line_arithmetic() {
    let buffer = "a\n\nb\nc";

    let outcome =
        apply_blocks(buffer, &[PatchBlock::new("\nb", "\nB")]).expect("patch applies");

    assert_eq!(outcome.text, "a\n\nB\nc");
    assert_eq!(line_count(&outcome.text), line_count(buffer));
}

#[test]
fn missing_fragment_is_not_found() {
    let result = apply_literal(PEOPLE_JSON, "\"name\": \"Nobody\",", "x");
    assert_matches!(result, Err(PatchError::NotFound { block: 0 }));
}

#[test]
fn empty_find_is_a_bad_patch_and_empty_replace_deletes() {
    assert_matches!(apply_literal(PEOPLE_JSON, "", "x"), Err(PatchError::BadPatch(_)));
    assert_matches!(
        apply_blocks(PEOPLE_JSON, &[PatchBlock::new(" \n\t", "x")]),
        Err(PatchError::BadPatch(_))
    );

    let outcome = apply_blocks("keep\ndrop me\nkeep too", &[PatchBlock::new("dropme", "")])
        .expect("deletion applies");
    assert_eq!(outcome.text, "keep\nkeep too");
}

#[test]
fn sequential_blocks_target_successive_occurrences() {
    let buffer = "{\n  \"first\": {\n    \"x\": 1\n  },\n  \"second\": {\n    \"x\": 1\n  }\n}";
    let blocks = vec![
        PatchBlock::new("\"x\": 1", "    \"x\": 2"),
        PatchBlock::new("\"x\": 1", "    \"x\": 3"),
    ];

    let outcome = apply_blocks(buffer, &blocks).expect("both blocks apply");

    assert_eq!(
        outcome.text,
        "{\n  \"first\": {\n    \"x\": 2\n  },\n  \"second\": {\n    \"x\": 3\n  }\n}"
    );
    assert_eq!(outcome.applied_blocks, 2);
}

#[test]
fn later_block_cannot_reuse_lines_of_an_earlier_block() {
    let buffer = "a\nb\nc\nd";
    let blocks = vec![PatchBlock::new("b\nc", "B\nC"), PatchBlock::new("c", "X")];

    assert_matches!(
        apply_blocks(buffer, &blocks),
        Err(PatchError::OverlappingBlocks { block: 1 })
    );
}

#[test]
fn blocks_must_appear_in_document_order() {
    let buffer = "one\ntwo\nthree";
    let blocks = vec![PatchBlock::new("three", "3"), PatchBlock::new("one", "1")];

    assert_matches!(
        apply_blocks(buffer, &blocks),
        Err(PatchError::NotFound { block: 1 })
    );
}

#[test]
fn failed_block_leaves_buffer_unchanged() {
    let buffer = "one\ntwo\nthree";
    let blocks = vec![PatchBlock::new("one", "1"), PatchBlock::new("four", "4")];

    assert_matches!(apply_blocks(buffer, &blocks), Err(PatchError::NotFound { block: 1 }));
    assert_eq!(buffer, "one\ntwo\nthree");
}

#[test]
fn marker_patch_round_trip_through_request() {
    let patch = "<<<<<<< SEARCH\n    fn old() {}\n=======\n    fn new() {}\n>>>>>>> REPLACE\n";
    let blocks = parse_search_replace(patch).expect("patch parses");

    let outcome = apply_patch("struct S;\n\nfn old() {}\n", &PatchRequest::Blocks(blocks))
        .expect("patch applies");

    assert_eq!(outcome.text, "struct S;\n\n    fn new() {}\n");
}

#[test]
fn apply_patch_to_file_writes_result_and_summary() {
    let dir = tempdir().expect("tempdir");
    let file = dir.path().join("lib.rs");
    std::fs::write(&file, "fn main() {\n    println!(\"hi\");\n}\n").expect("seed file");

    let patch = "<<<<<<< SEARCH\nprintln!(\"hi\");\n=======\n    println!(\"hello\");\n>>>>>>> REPLACE";
    let mut stdout = Vec::new();
    apply_patch_to_file(&file, patch, &mut stdout).expect("patch applies");

    assert_eq!(
        std::fs::read_to_string(&file).expect("read"),
        "fn main() {\n    println!(\"hello\");\n}\n"
    );
    let summary = String::from_utf8(stdout).expect("utf8");
    assert!(summary.starts_with("Success. Applied 1 block(s)"));
    assert!(summary.contains("+    println!(\"hello\");"));
}

#[test]
fn apply_patch_to_file_reports_missing_file() {
    let dir = tempdir().expect("tempdir");
    let missing = dir.path().join("missing.rs");
    let patch = "<<<<<<< SEARCH\na\n=======\nb\n>>>>>>> REPLACE";

    let error = apply_patch_to_file(&missing, patch, &mut Vec::new()).expect_err("must fail");
    assert!(error.to_string().contains("I/O error while reading"));
}
