use std::fmt::Write as _;

use restyle_index::ScoredCandidate;
use restyle_llm::{LlmRequest, SOURCE_END, SOURCE_START};

const SYSTEM_PROMPT: &str = "你是《东方烟草报》的资深编辑，擅长风格学习和改写。严格按照示例学习风格特征，生成符合目标栏目要求的高质量稿件。";
const EXEMPLAR_BODY_CHARS: usize = 200;

/// Column ids and their display names.
const COLUMNS: &[(&str, &str)] = &[
    ("news_general", "要闻"),
    ("economic_data", "经济运行"),
    ("policy_interpretation", "政策解读"),
    ("case_observation", "案例"),
];

/// Accepts either a column id or its display name; unknown values fall back
/// to `news_general`.
pub fn resolve_category(value: &str) -> &'static str {
    COLUMNS
        .iter()
        .find(|(id, name)| *id == value || *name == value)
        .map(|(id, _)| *id)
        .unwrap_or("news_general")
}

fn display_name(category: &str) -> &'static str {
    COLUMNS
        .iter()
        .find(|(id, _)| *id == category)
        .map(|(_, name)| *name)
        .unwrap_or("要闻")
}

fn column_guidance(category: &str) -> &'static str {
    match category {
        "economic_data" => {
            "- 标题：数字前置突出亮点，如\"45.2万箱：某地卷烟销售创新高\"\n\
             - 导语：核心数据开篇，包含同比变化，40-80字\n\
             - 正文：数据概览→结构分析→效益评估→后续目标\n\
             - 语言：重视\"同比增长、销售收入、结构优化\"等专业术语"
        }
        "policy_interpretation" => {
            "- 标题：政策要点+执行路径，权威严谨\n\
             - 导语：政策背景+核心内容+执行要求，40-80字\n\
             - 正文：政策解读→执行机制→预期效果→保障措施\n\
             - 语言：强调\"贯彻落实、统筹推进、机制建设\"等权威表达"
        }
        "case_observation" => {
            "- 标题：典型做法/成果导向，突出示范性\n\
             - 导语：典型场景+创新做法+示范效果，40-80字\n\
             - 正文：问题背景→创新实践→成效亮点→经验价值\n\
             - 语言：突出\"典型经验、创新实践、示范引领、复制推广\""
        }
        _ => {
            "- 标题：主体+动作/成果，官方庄重，不使用感叹号\n\
             - 导语：时间+地点+主体+行动+结果，40-80字\n\
             - 正文：背景→举措→成效→展望，逻辑清晰\n\
             - 语言：使用\"召开、部署、推进、落实、协同\"等正式表达"
        }
    }
}

/// Few-shot rewrite prompt around already-encoded source text.
pub fn build_rewrite_prompt(
    encoded_source: &str,
    category: &str,
    exemplars: &[ScoredCandidate],
    strict: bool,
) -> LlmRequest {
    let column = display_name(category);
    let mut user = String::new();

    if strict {
        user.push_str(
            "【严格模式约束】\n\
             1. 不能修改或删除原文中的任何数字、日期、机构名称\n\
             2. 不能添加原文中不存在的数字或事实信息\n\
             3. 如发现冲突，以事实准确为准\n\n",
        );
    }

    if !exemplars.is_empty() {
        let _ = writeln!(
            user,
            "【风格学习示例】\n以下是{column}栏目的优秀范例，请学习其写作风格和结构特征：\n"
        );
        for (i, candidate) in exemplars.iter().enumerate() {
            let doc = &candidate.document;
            let _ = writeln!(user, "示例{}：", i + 1);
            let _ = writeln!(user, "标题：{}", doc.title);
            if !doc.lead.is_empty() {
                let _ = writeln!(user, "导语：{}", doc.lead);
            }
            let excerpt: String = doc.body.chars().take(EXEMPLAR_BODY_CHARS).collect();
            let _ = writeln!(user, "正文片段：{excerpt}...");
            if !doc.tags.is_empty() {
                let _ = writeln!(user, "栏目特征：{}", doc.tags.join("、"));
            }
            user.push('\n');
        }
    }

    let _ = writeln!(
        user,
        "【{column}栏目写作规范】\n{}\n",
        column_guidance(category)
    );
    let _ = writeln!(
        user,
        "【改写任务】\n请将以下文章改写为符合{column}栏目标准的稿件。形如{{{{DATE_1}}}}、{{{{NUM_1}}}}、{{{{ORG_1}}}}的占位符必须原样保留。\n"
    );
    let _ = writeln!(user, "{SOURCE_START}\n{encoded_source}\n");
    let _ = write!(
        user,
        "{SOURCE_END}\n严格按照以下格式输出，不要添加其他内容：\n\n\
         ===标题===\n[标题]\n\n\
         ===导语===\n[40-80字的导语]\n\n\
         ===正文===\n[改写后的正文]\n\n\
         ===风格说明===\n[从示例中学到的关键风格特征]\n"
    );

    LlmRequest {
        system: Some(SYSTEM_PROMPT.to_string()),
        user,
        temperature: None,
        max_tokens: None,
    }
}

#[cfg(test)]
mod tests {
    use restyle_index::SampleDocument;

    use super::*;

    #[test]
    fn categories_accept_ids_and_names() {
        assert_eq!(resolve_category("经济运行"), "economic_data");
        assert_eq!(resolve_category("case_observation"), "case_observation");
        assert_eq!(resolve_category("其他"), "news_general");
    }

    #[test]
    fn prompt_wraps_source_between_markers() {
        let exemplar = ScoredCandidate {
            document: SampleDocument::new("s1", "示例标题", "示例导语", "示例正文")
                .with_tags(["economic_data"]),
            score: 1.5,
        };
        let req = build_rewrite_prompt("{{DATE_1}}，销售{{NUM_1}}。", "economic_data", &[exemplar], true);
        let start = req.user.find(SOURCE_START).unwrap();
        let end = req.user.find(SOURCE_END).unwrap();
        assert!(start < end);
        assert!(req.user[start..end].contains("{{DATE_1}}，销售{{NUM_1}}。"));
        assert!(req.user.contains("示例1：\n标题：示例标题"));
        assert!(req.user.contains("严格模式约束"));
        assert!(req.user.contains("经济运行栏目写作规范"));
        // Format placeholders in the instructions must not leak into the source block.
        assert!(!req.user[start..end].contains("{{ORG_1}}"));
    }
}
