// Benchmark helper functions - Rust's dead code analysis doesn't understand
// that these are used by benchmark files in the same directory
#[allow(dead_code)]
pub fn generate_transcript(turns: usize) -> String {
    let turn = "<thinking>The user wants a summary. Check `<status>` first.\n</思考>\nHere is the answer with **bold** text.\n\n```xml\n<summary>not a tag</summary>\n```\n<UpdateVariable>\n<thinking>hp drops</thinking>\n_.set('hp', 9);\n</UpdateVariable>\n<StatusBar>HP 9</StatusBar>\n";
    turn.repeat(turns)
}

#[allow(dead_code)]
pub fn chunked(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(size).map(|c| c.iter().collect()).collect()
}
