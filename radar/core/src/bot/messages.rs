//! User-facing replies

use crate::event::EventRecord;
use crate::subscription::Subscription;

pub const QUERY_USAGE: &str = "请提供查询关键词，例如：漫展 查询 南京";
pub const IMAGE_QUERY_USAGE: &str = "请提供查询关键词，例如：漫展 图片查询 南京";
pub const SUBSCRIBE_USAGE: &str = "请提供订阅关键词，例如：漫展 订阅 南京";

pub const NOT_FOUND: &str = "未找到相关漫展信息。";
pub const QUERY_FAILED: &str = "查询失败，请稍后重试。";
pub const STORE_FAILED: &str = "操作失败，请稍后重试。";
pub const RENDERER_UNAVAILABLE: &str = "图片渲染功能需要 puppeteer 服务，请联系管理员启用。";

pub const RENDERING_NOTICE: &str = "✨ 正在查询并渲染图片，请稍候...";

pub const NO_SUBSCRIPTIONS: &str = "你没有订阅任何漫展。";
pub const NO_SUBSCRIBED_EVENTS: &str = "未找到订阅的漫展信息。";

pub const CONFIRM_UNSUBSCRIBE_ALL: &str = "确定取消所有订阅？（是/否）";
pub const CONFIRM_YES: &str = "是";
pub const UNSUBSCRIBED_ALL: &str = "已取消所有订阅。";
pub const OPERATION_ABORTED: &str = "操作取消。";

pub const SELECTION_CANCELED: &str = "已取消操作。";
pub const SELECTION_INVALID: &str = "无效选择，请输入正确的序号。";
pub const SELECTION_TIMEOUT: &str = "超时未选择，请重新查询。";

/// Prompt under text lists
pub const TEXT_SELECT_PROMPT: &str = "请输入序号查看详情，输入“0”取消。";
/// Prompt under rendered lists, appended after the image
pub const IMAGE_SELECT_PROMPT: &str = "\n请输入序号查看详情，输入\"0\"取消。";

/// Title of a rendered single-keyword list
pub fn image_list_title(keyword: &str) -> String {
    format!("漫展查询：{keyword}")
}

/// Title of a rendered fan-out list
pub const BATCH_IMAGE_TITLE: &str = "订阅漫展一键查询";

pub fn batch_rendering_notice(keywords: usize) -> String {
    format!("✨ 正在查询 {keywords} 个订阅并渲染图片，请稍候...")
}

/// `[i]\t name - address` lines under a header
pub fn text_list(records: &[EventRecord]) -> String {
    let lines: Vec<String> = records
        .iter()
        .enumerate()
        .map(|(i, r)| format!("[{}]\t {} - {}", i + 1, r.name, r.address))
        .collect();
    format!("找到以下漫展信息：\n{}\n{TEXT_SELECT_PROMPT}", lines.join("\n"))
}

/// `i. [kw] name - address` lines for fan-out results
pub fn batch_text_list(records: &[EventRecord]) -> String {
    let lines: Vec<String> = records
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "{}. [{}] {} - {}",
                i + 1,
                r.keyword.as_deref().unwrap_or_default(),
                r.name,
                r.address
            )
        })
        .collect();
    format!("订阅关键词的漫展信息：\n{}\n{TEXT_SELECT_PROMPT}", lines.join("\n"))
}

pub fn subscribed(keyword: &str) -> String {
    format!("已订阅「{keyword}」的漫展信息。")
}

pub fn unsubscribed(keyword: &str, removed: bool) -> String {
    if removed {
        format!("已取消订阅「{keyword}」。")
    } else {
        format!("未找到「{keyword}」的订阅。")
    }
}

pub fn subscription_list(subscriptions: &[Subscription]) -> String {
    let lines: Vec<String> = subscriptions
        .iter()
        .map(|s| format!("- {}", s.keyword))
        .collect();
    format!("你订阅的漫展关键词：\n{}", lines.join("\n"))
}

/// Command overview; image commands are listed only when enabled
pub fn help(image_query: bool, image_batch_query: bool) -> String {
    let mut lines = vec!["漫展查询和订阅管理", "漫展 查询 <关键词>"];
    if image_query {
        lines.push("漫展 图片查询 <关键词>  (别名 tpcx)");
    }
    lines.push("漫展 一键查询");
    if image_batch_query {
        lines.push("漫展 一键图片查询  (别名 yjtpcx)");
    }
    lines.extend(["漫展 订阅 <关键词>", "漫展 取消订阅 [关键词]", "漫展 订阅列表"]);
    lines.join("\n")
}
