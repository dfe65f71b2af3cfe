//! Administrator facing plugin settings.

use serde::Serialize;

use crate::{
    allowlist::CourseAllowList,
    error::Result,
    lms::{Lms, PLUGIN},
};

pub const PLUGIN_DISPLAY_NAME: &str = "Reflect Web Service";

/// A multi-line text setting stored raw in the plugin configuration.
#[derive(Debug, Clone, Copy)]
pub struct TextareaSetting {
    pub name: &'static str,
    pub visiblename: &'static str,
    pub description: &'static str,
    pub default: &'static str,
    pub cols: u16,
    pub rows: u16,
}

/// Allow-listed course identifiers, one per line.
pub const COURSE_IDS: TextareaSetting = TextareaSetting {
    name: "courseID",
    visiblename: "Course ID number",
    description: "Course ID number of the reflection course",
    default: "UPR1",
    cols: 60,
    rows: 8,
};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SettingView {
    pub plugin: &'static str,
    pub pluginname: &'static str,
    pub name: &'static str,
    pub visiblename: &'static str,
    pub description: &'static str,
    pub default: &'static str,
    pub cols: u16,
    pub rows: u16,
    pub value: Option<String>,
}

/// Stores the default of every setting that has no value yet.
pub async fn install_defaults(lms: &dyn Lms) -> Result<()> {
    if lms.plugin_config(PLUGIN, COURSE_IDS.name).await?.is_none() {
        lms.set_plugin_config(PLUGIN, COURSE_IDS.name, COURSE_IDS.default)
            .await?;
        tracing::info!(setting = COURSE_IDS.name, "installed default setting");
    }
    Ok(())
}

pub async fn load_allowlist(lms: &dyn Lms) -> Result<CourseAllowList> {
    let raw = lms.plugin_config(PLUGIN, COURSE_IDS.name).await?;
    Ok(CourseAllowList::parse(raw.as_deref()))
}

pub async fn view(lms: &dyn Lms) -> Result<SettingView> {
    let value = lms.plugin_config(PLUGIN, COURSE_IDS.name).await?;
    Ok(SettingView {
        plugin: PLUGIN,
        pluginname: PLUGIN_DISPLAY_NAME,
        name: COURSE_IDS.name,
        visiblename: COURSE_IDS.visiblename,
        description: COURSE_IDS.description,
        default: COURSE_IDS.default,
        cols: COURSE_IDS.cols,
        rows: COURSE_IDS.rows,
        value,
    })
}

pub async fn update_course_ids(lms: &dyn Lms, value: &str) -> Result<SettingView> {
    lms.set_plugin_config(PLUGIN, COURSE_IDS.name, value).await?;
    tracing::info!(setting = COURSE_IDS.name, "setting updated");
    view(lms).await
}
