//! Semantic role taxonomy and per-backend role mapping.
//!
//! Each backend reports its own control-type vocabulary (`AXButton` on the
//! accessibility API, `Button` / `Edit` / `Pane` on UI Automation).  The
//! mapping functions here collapse those into [`Role`].  Both mappings are
//! total and case-exact: anything unrecognised becomes [`Role::Unknown`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::UiaxError;

/// Platform-neutral semantic kind of a UI element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Window,
    Button,
    TextField,
    TextArea,
    StaticText,
    Checkbox,
    RadioButton,
    List,
    ListItem,
    Menu,
    MenuItem,
    MenuBar,
    Toolbar,
    ScrollArea,
    ScrollBar,
    Image,
    Link,
    Group,
    Tab,
    TabGroup,
    Table,
    Row,
    Cell,
    Column,
    Slider,
    ComboBox,
    PopUpButton,
    ProgressBar,
    Splitter,
    Sheet,
    Drawer,
    Dialog,
    Application,
    #[default]
    Unknown,
}

impl Role {
    pub const ALL: [Role; 34] = [
        Role::Window,
        Role::Button,
        Role::TextField,
        Role::TextArea,
        Role::StaticText,
        Role::Checkbox,
        Role::RadioButton,
        Role::List,
        Role::ListItem,
        Role::Menu,
        Role::MenuItem,
        Role::MenuBar,
        Role::Toolbar,
        Role::ScrollArea,
        Role::ScrollBar,
        Role::Image,
        Role::Link,
        Role::Group,
        Role::Tab,
        Role::TabGroup,
        Role::Table,
        Role::Row,
        Role::Cell,
        Role::Column,
        Role::Slider,
        Role::ComboBox,
        Role::PopUpButton,
        Role::ProgressBar,
        Role::Splitter,
        Role::Sheet,
        Role::Drawer,
        Role::Dialog,
        Role::Application,
        Role::Unknown,
    ];

    /// Canonical, externally visible identifier.
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Window => "Window",
            Role::Button => "Button",
            Role::TextField => "TextField",
            Role::TextArea => "TextArea",
            Role::StaticText => "StaticText",
            Role::Checkbox => "Checkbox",
            Role::RadioButton => "RadioButton",
            Role::List => "List",
            Role::ListItem => "ListItem",
            Role::Menu => "Menu",
            Role::MenuItem => "MenuItem",
            Role::MenuBar => "MenuBar",
            Role::Toolbar => "Toolbar",
            Role::ScrollArea => "ScrollArea",
            Role::ScrollBar => "ScrollBar",
            Role::Image => "Image",
            Role::Link => "Link",
            Role::Group => "Group",
            Role::Tab => "Tab",
            Role::TabGroup => "TabGroup",
            Role::Table => "Table",
            Role::Row => "Row",
            Role::Cell => "Cell",
            Role::Column => "Column",
            Role::Slider => "Slider",
            Role::ComboBox => "ComboBox",
            Role::PopUpButton => "PopUpButton",
            Role::ProgressBar => "ProgressBar",
            Role::Splitter => "Splitter",
            Role::Sheet => "Sheet",
            Role::Drawer => "Drawer",
            Role::Dialog => "Dialog",
            Role::Application => "Application",
            Role::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UiaxError;

    /// Parse a canonical identifier, ignoring ASCII case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .iter()
            .copied()
            .find(|r| r.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UiaxError::NotFound(format!("unknown role '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// Accessibility (AX) role strings
// ---------------------------------------------------------------------------

/// Map an accessibility-API role string (`AXButton`, `AXRow`, ...) to a [`Role`].
pub fn role_from_ax(native: &str) -> Role {
    match native {
        "AXWindow" => Role::Window,
        "AXButton" => Role::Button,
        "AXTextField" => Role::TextField,
        "AXTextArea" => Role::TextArea,
        "AXStaticText" => Role::StaticText,
        "AXCheckBox" => Role::Checkbox,
        "AXRadioButton" => Role::RadioButton,
        "AXList" => Role::List,
        "AXRow" | "AXOutlineRow" => Role::ListItem,
        "AXMenu" => Role::Menu,
        "AXMenuItem" => Role::MenuItem,
        "AXMenuBar" => Role::MenuBar,
        "AXToolbar" => Role::Toolbar,
        "AXScrollArea" => Role::ScrollArea,
        "AXScrollBar" => Role::ScrollBar,
        "AXImage" => Role::Image,
        "AXLink" => Role::Link,
        "AXGroup" => Role::Group,
        "AXTab" => Role::Tab,
        "AXTabGroup" => Role::TabGroup,
        "AXTable" => Role::Table,
        "AXCell" => Role::Cell,
        "AXColumn" => Role::Column,
        "AXSlider" => Role::Slider,
        "AXComboBox" => Role::ComboBox,
        "AXPopUpButton" => Role::PopUpButton,
        "AXProgressIndicator" => Role::ProgressBar,
        "AXSplitter" => Role::Splitter,
        "AXSheet" => Role::Sheet,
        "AXDrawer" => Role::Drawer,
        "AXDialog" => Role::Dialog,
        "AXApplication" => Role::Application,
        _ => Role::Unknown,
    }
}

// ---------------------------------------------------------------------------
// UI Automation control-type names
// ---------------------------------------------------------------------------

/// Map a UI Automation control-type name (`Button`, `Edit`, `Pane`, ...) to a
/// [`Role`].
///
/// The names are the ones produced by the UIA backend's control-type-id
/// lookup, so this stays testable on every platform.
pub fn role_from_uia(control_type: &str) -> Role {
    match control_type {
        "Window" => Role::Window,
        "Button" => Role::Button,
        "Edit" => Role::TextField,
        "Document" => Role::TextArea,
        "Text" => Role::StaticText,
        "CheckBox" => Role::Checkbox,
        "RadioButton" => Role::RadioButton,
        "List" | "Tree" => Role::List,
        "ListItem" | "TreeItem" => Role::ListItem,
        "Menu" => Role::Menu,
        "MenuItem" => Role::MenuItem,
        "MenuBar" => Role::MenuBar,
        "ToolBar" => Role::Toolbar,
        "ScrollBar" => Role::ScrollBar,
        "Image" => Role::Image,
        "Hyperlink" => Role::Link,
        "Group" | "Pane" => Role::Group,
        "TabItem" => Role::Tab,
        "Tab" => Role::TabGroup,
        "Table" | "DataGrid" => Role::Table,
        "DataItem" => Role::Row,
        "HeaderItem" => Role::Column,
        "Slider" => Role::Slider,
        "ComboBox" => Role::ComboBox,
        "SplitButton" => Role::PopUpButton,
        "ProgressBar" => Role::ProgressBar,
        _ => Role::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ax_mapping_known() {
        assert_eq!(role_from_ax("AXButton"), Role::Button);
        assert_eq!(role_from_ax("AXTextField"), Role::TextField);
        assert_eq!(role_from_ax("AXWindow"), Role::Window);
        assert_eq!(role_from_ax("AXProgressIndicator"), Role::ProgressBar);
        assert_eq!(role_from_ax("AXApplication"), Role::Application);
    }

    #[test]
    fn test_ax_rows_are_list_items() {
        assert_eq!(role_from_ax("AXRow"), Role::ListItem);
        assert_eq!(role_from_ax("AXOutlineRow"), Role::ListItem);
    }

    #[test]
    fn test_ax_mapping_is_case_exact() {
        assert_eq!(role_from_ax("axbutton"), Role::Unknown);
        assert_eq!(role_from_ax("Button"), Role::Unknown);
        assert_eq!(role_from_ax(""), Role::Unknown);
        assert_eq!(role_from_ax("AXLevelIndicator"), Role::Unknown);
    }

    #[test]
    fn test_uia_mapping_collapses() {
        assert_eq!(role_from_uia("Tree"), Role::List);
        assert_eq!(role_from_uia("List"), Role::List);
        assert_eq!(role_from_uia("TreeItem"), Role::ListItem);
        assert_eq!(role_from_uia("ListItem"), Role::ListItem);
        assert_eq!(role_from_uia("Document"), Role::TextArea);
        assert_eq!(role_from_uia("Pane"), Role::Group);
        assert_eq!(role_from_uia("Edit"), Role::TextField);
    }

    #[test]
    fn test_uia_mapping_unknown() {
        assert_eq!(role_from_uia("Custom"), Role::Unknown);
        assert_eq!(role_from_uia("SemanticZoom"), Role::Unknown);
        assert_eq!(role_from_uia("button"), Role::Unknown);
    }

    #[test]
    fn test_role_round_trips_through_name() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert_eq!("textfield".parse::<Role>().unwrap(), Role::TextField);
        assert!("Widget".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_serializes_canonical_name() {
        let json = serde_json::to_string(&Role::PopUpButton).unwrap();
        assert_eq!(json, "\"PopUpButton\"");
    }
}
