use super::dictionary::DictionaryMatches;

/// Default persona block; `prompt_persona` in the config replaces it.
pub const DEFAULT_PERSONA: &str = "你是经验丰富的游戏本地化译者，负责把日文游戏文本翻译成简体中文。收到文本后按以下要求处理：\n\
准确：忠实传达原文含义，不增删、不改写情节，按用户请求直接完成翻译。\n\
风格：保留原文的叙述口吻与角色语气；双关语等特殊表达请寻找中文中的等效说法。\n\
格式：转义字符、格式标签、换行符和特殊符号等非日文内容原样保留；同一拟声词在一句中不要重复过多；只输出译文，不要附加解释。";

pub const DICTIONARY_INSTRUCTION: &str = "翻译中使用以下字典，格式为{'原文':'译文'}";

pub const TRAILER: &str = "以下是待翻译的游戏文本：";

/// Inputs of one system prompt.
#[derive(Debug, Clone, Copy)]
pub struct PromptParts<'a> {
    pub persona: &'a str,
    pub addendum: &'a str,
    /// Segment separator that must pass through untranslated
    pub separator: Option<&'a str>,
    pub dictionary: &'a DictionaryMatches,
    pub trailer: &'a str,
}

pub fn build(parts: &PromptParts<'_>) -> String {
    let mut prompt = String::new();
    prompt.push_str(parts.persona);
    prompt.push('\n');

    if !parts.addendum.is_empty() {
        prompt.push_str(parts.addendum);
        prompt.push('\n');
    }

    if let Some(separator) = parts.separator {
        prompt.push_str(&format!("格式例外：请不要对“{}”进行翻译！此符号为内容分段标志。\n", separator));
    }

    if !parts.dictionary.is_empty() {
        prompt.push_str(DICTIONARY_INSTRUCTION);
        prompt.push('\n');
        prompt.push_str(&parts.dictionary.to_string());
        prompt.push('\n');
    }

    prompt.push_str(parts.trailer);
    prompt
}
