//! System prompt assembly.
//!
//! The prompt teaches the model the tag protocol and advertises every
//! installed route as a `<tool>` block. It is rebuilt from the registry on
//! demand so newly installed apps are visible to fresh threads.

use crate::app::AppRegistry;
use crate::types::ExecutionMode;

const INTRO: &str = "You are RiCA, a reasoning runtime that can call tools while it thinks. \
You may keep reasoning while a background tool runs and react to its result when it arrives.

IMPORTANT: only content generated inside a <rica> block is processed by the runtime. \
Everything else is your private reasoning and is never shown to the user.

Here are the tools you can use:";

const GUIDANCE: &str = "Here is how to call a tool.

To send a message to the user, call the rica package's /response route:
<rica package=\"rica\" route=\"/response\">[{\"type\":\"text\",\"content\":\"Hello, world!\"}]</rica>

For a long-running tool you can request background execution and a timeout in milliseconds:
<rica package=\"sys.shell\" route=\"/exec\" background=\"true\" timeout=\"10000\">{\"command\":\"ls\"}</rica>

A foreground call appends its result immediately after the tag:
{\"status\":\"success\"}
or an error such as:
{\"status\":\"error\",\"error\":\"Something went wrong.\"}

A background call returns a call id immediately:
{\"call_id\":\"1234-xxxx-7890\"}
and the result arrives later as a callback block:
<rica-callback callid=\"1234-xxxx-7890\">{\"status\":\"success\"}</rica-callback>

Think before responding. For long tasks, respond in steps: emit a response block early, \
keep reasoning, and emit further response blocks as you make progress. Each response block \
is shown to the user as soon as it is complete, even while generation continues.";

/// Render one route as a `<tool>` inventory block.
fn tool_block(package: &str, route: &crate::app::Route) -> String {
    let background = matches!(route.mode, ExecutionMode::Background);
    let timeout = route
        .timeout_ms
        .map(|ms| ms.to_string())
        .unwrap_or_else(|| "none".to_string());
    let schema = route
        .schema
        .as_ref()
        .map(|s| format!("\n    <schema>{s}</schema>"))
        .unwrap_or_default();

    format!(
        "<tool>\n    <package>{package}</package>\n    <route>{}</route>\n    \
         <background>{background}</background>\n    <timeout>{timeout}</timeout>\n    \
         <description>{}</description>{schema}\n</tool>",
        route.path, route.description,
    )
}

/// Build the full system prompt for the current registry contents.
///
/// Apps are sorted by package name so the prompt is stable across runs.
pub fn build_system_prompt(registry: &AppRegistry) -> String {
    let mut apps = registry.apps();
    apps.sort_by(|a, b| a.package().cmp(b.package()));

    let tools: Vec<String> = apps
        .iter()
        .flat_map(|app| {
            app.routes()
                .iter()
                .map(|route| tool_block(app.package(), route))
        })
        .collect();

    format!("{INTRO}\n{}\n{GUIDANCE}\n", tools.join("\n"))
}
