// Query parameter vocabulary tests

use rstest::rstest;

use imagist::proxy::parse_query;
use imagist::transform::{
    FitMode, Interpolation, MimeType, OperationList, OutputFormat, ParseOptions, Position,
    TransformSpec,
};

fn spec(raw: &str) -> TransformSpec {
    TransformSpec::parse(&parse_query(Some(raw)), &ParseOptions::default())
}

#[rstest]
#[case("w=320&h=240", "width=320&height=240")]
#[case("q=55", "quality=55")]
#[case("fmt=png", "format=png")]
#[case("r=90", "rotate=90")]
#[case("w=10&pos=left", "w=10&position=left")]
#[case("w=10&i=nearest", "w=10&interpolation=nearest")]
#[case("w=10&bg=fff", "w=10&background=fff")]
#[case("w=10&max", "w=10&enlarge")]
#[case("sharp", "sharpen")]
#[case("neg", "negative")]
#[case("gs", "grayscale")]
fn test_terse_and_verbose_names_agree(#[case] terse: &str, #[case] verbose: &str) {
    assert_eq!(spec(terse), spec(verbose));
}

#[rstest]
#[case("north", Position::Top)]
#[case("southeast", Position::RightBottom)]
#[case("west", Position::Left)]
#[case("detail", Position::Entropy)]
#[case("luminance", Position::Attention)]
fn test_position_aliases(#[case] raw: &str, #[case] expected: Position) {
    let resize = spec(&format!("w=100&pos={}", raw)).resize.unwrap();
    assert_eq!(resize.position, Some(expected));
}

#[test]
fn test_content_aware_position_requires_cover() {
    let contain = spec("w=100&pos=entropy&fit=contain").resize.unwrap();
    assert_eq!(contain.fit, FitMode::Contain);
    assert_eq!(contain.position, None);

    let cover = spec("w=100&pos=entropy").resize.unwrap();
    assert_eq!(cover.fit, FitMode::Cover);
    assert_eq!(cover.position, Some(Position::Entropy));
}

#[test]
fn test_content_aware_rule_can_be_disabled() {
    let options = ParseOptions {
        content_aware_requires_cover: false,
        ..Default::default()
    };
    let parsed = TransformSpec::parse(
        &parse_query(Some("w=100&pos=attention&fit=inside")),
        &options,
    );
    assert_eq!(parsed.resize.unwrap().position, Some(Position::Attention));
}

#[test]
fn test_one_bad_value_leaves_the_rest() {
    let parsed = spec("w=200&h=100&q=abc&fmt=webp&i=bogus&blur=0.1");
    assert_eq!(parsed.quality, 80);
    assert_eq!(parsed.output_format, Some(OutputFormat::Webp));
    assert_eq!(parsed.blur_sigma, None);

    let resize = parsed.resize.unwrap();
    assert_eq!(resize.width, Some(200));
    assert_eq!(resize.height, Some(100));
    assert_eq!(resize.interpolation, Interpolation::Lanczos3);
}

#[test]
fn test_empty_query_is_identity() {
    let parsed = spec("");
    assert_eq!(parsed, TransformSpec::default());

    let operations = OperationList::build(&parsed, MimeType::Png);
    assert!(operations.is_empty());
    assert_eq!(operations.content_type(), "image/png");
}

#[test]
fn test_gif_source_defaults_to_jpeg_output() {
    let operations = OperationList::build(&spec("w=50"), MimeType::Gif);
    assert_eq!(operations.encode().format, OutputFormat::Jpeg);
    assert_eq!(operations.content_type(), "image/jpeg");
}

#[rstest]
#[case("trim", Some(10))]
#[case("trim=42", Some(42))]
#[case("trim=0", None)]
#[case("trim=false", None)]
fn test_trim_threshold(#[case] raw: &str, #[case] expected: Option<u32>) {
    assert_eq!(spec(raw).trim_threshold, expected);
}
