use super::Task;

const VERBATIM_RULES: &str = "Copy every comment character for character. Never paraphrase, \
shorten, merge, split or correct a comment, and never invent new ones.";

/// Instructions sent with each task. The payload follows the prompt as JSON.
pub fn for_task(task: Task) -> String {
    match task {
        Task::Classify => classification_prompt(),
        Task::Filter => filter_prompt(),
        Task::Theme => theme_prompt(),
        Task::Sentiment => sentiment_prompt(),
    }
}

pub fn classification_prompt() -> String {
    format!(
        "You receive survey feedback as a JSON object mapping a group name to a list of comments.\n\
         For every group, sort each comment into exactly one of two lists: positiveComments \
         (praise, things that worked) or criticalComments (complaints, problems, suggestions). \
         Every input comment must appear in exactly one list. Only comments that are themselves \
         just \"none\" or \"n/a\" may be dropped. {VERBATIM_RULES}\n\
         Also write a short neutral summary (two sentences at most) of the group's feedback.\n\
         Respond with JSON only, in this shape:\n\
         {{\"<group>\": {{\"summary\": \"...\", \"positiveComments\": [\"...\"], \"criticalComments\": [\"...\"]}}}}"
    )
}

pub fn filter_prompt() -> String {
    format!(
        "You receive classified survey feedback as a JSON object mapping a group name to \
         {{\"positiveComments\": [...], \"criticalComments\": [...]}}.\n\
         Remove low-information comments: very short or generic praise or complaints \
         (for example \"good\", \"great session\", \"boring\") that say nothing specific. \
         Keep everything that names a concrete topic, and keep a comment whenever you are unsure. \
         A kept comment stays in the list it came from. {VERBATIM_RULES}\n\
         Respond with JSON only, in this shape:\n\
         {{\"<group>\": {{\"positiveComments\": [\"...\"], \"criticalComments\": [\"...\"]}}}}"
    )
}

pub fn theme_prompt() -> String {
    format!(
        "You receive survey feedback as a JSON object mapping a group name to a list of comments.\n\
         For every group, cluster the comments into themes. Create a theme only when at least two \
         comments share a topic, and give it a short title naming that topic. Put every remaining \
         comment under the theme \"Miscellaneous\". Every input comment must appear in exactly one \
         theme. {VERBATIM_RULES}\n\
         Respond with JSON only, in this shape:\n\
         {{\"<group>\": {{\"themes\": {{\"<theme title>\": [\"...\"], \"Miscellaneous\": [\"...\"]}}}}}}"
    )
}

pub fn sentiment_prompt() -> String {
    "You receive a JSON array of words taken from survey feedback.\n\
     Label each word with the sentiment it usually carries in course feedback: \
     \"positive\", \"negative\" or \"neutral\".\n\
     Respond with JSON only, an object mapping each input word to its label: \
     {\"<word>\": \"positive\"}"
        .to_string()
}
