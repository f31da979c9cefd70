//! Named pipeline tasks and their fixed build order.

use crate::resources::Category;
use std::fmt;
use std::str::FromStr;

/// One named stage of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    /// Delete the output tree
    Clean,
    /// Copy static files byte-for-byte
    Copy,
    /// Compile pages
    IncludeHtml,
    /// Compile the entry stylesheet
    Style,
    /// Compile dev scripts
    Js,
    /// Copy vendor scripts
    JsCopy,
    /// Optimize images
    Images,
    /// Build the icon sprite
    SvgSprite,
}

impl Task {
    /// Stages of `build`, in the order they run.
    pub const BUILD_ORDER: [Task; 8] = [
        Task::Clean,
        Task::Copy,
        Task::IncludeHtml,
        Task::Style,
        Task::Js,
        Task::JsCopy,
        Task::Images,
        Task::SvgSprite,
    ];

    /// Operation name as exposed on the command line.
    pub fn name(self) -> &'static str {
        match self {
            Task::Clean => "clean",
            Task::Copy => "copy",
            Task::IncludeHtml => "includeHtml",
            Task::Style => "style",
            Task::Js => "js",
            Task::JsCopy => "jsCopy",
            Task::Images => "images",
            Task::SvgSprite => "svgSprite",
        }
    }

    /// Task rerun when a file of `category` changes.
    pub fn for_category(category: Category) -> Task {
        match category {
            Category::Pages | Category::Markup => Task::IncludeHtml,
            Category::Scripts => Task::Js,
            Category::Vendor => Task::JsCopy,
            Category::Styles => Task::Style,
            Category::Static => Task::Copy,
            Category::Images => Task::Images,
            Category::Sprite => Task::SvgSprite,
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error for an unknown task name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown task '{0}'")]
pub struct UnknownTask(pub String);

impl FromStr for Task {
    type Err = UnknownTask;

    /// Accepts both `includeHtml` and `include-html` spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clean" => Ok(Task::Clean),
            "copy" => Ok(Task::Copy),
            "includeHtml" | "include-html" => Ok(Task::IncludeHtml),
            "style" => Ok(Task::Style),
            "js" => Ok(Task::Js),
            "jsCopy" | "js-copy" => Ok(Task::JsCopy),
            "images" => Ok(Task::Images),
            "svgSprite" | "svg-sprite" => Ok(Task::SvgSprite),
            _ => Err(UnknownTask(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_order_starts_with_clean() {
        assert_eq!(Task::BUILD_ORDER[0], Task::Clean);
        assert_eq!(Task::BUILD_ORDER[7], Task::SvgSprite);
        let names: Vec<_> = Task::BUILD_ORDER.iter().map(|t| t.name()).collect();
        assert_eq!(
            names,
            vec!["clean", "copy", "includeHtml", "style", "js", "jsCopy", "images", "svgSprite"]
        );
    }

    #[test]
    fn test_parse_names_and_aliases() {
        for task in Task::BUILD_ORDER {
            assert_eq!(task.name().parse::<Task>().unwrap(), task);
        }
        assert_eq!("include-html".parse::<Task>().unwrap(), Task::IncludeHtml);
        assert_eq!("svg-sprite".parse::<Task>().unwrap(), Task::SvgSprite);
        assert_eq!("serve".parse::<Task>(), Err(UnknownTask("serve".to_string())));
    }

    #[test]
    fn test_every_category_has_a_task() {
        assert_eq!(Task::for_category(Category::Markup), Task::IncludeHtml);
        assert_eq!(Task::for_category(Category::Styles), Task::Style);
        assert_eq!(Task::for_category(Category::Sprite), Task::SvgSprite);
    }
}
