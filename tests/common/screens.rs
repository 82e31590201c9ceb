use screen_abstraction::model::window::WindowKind;
use screen_abstraction::observation::observation_model::{ConcreteObservation, ConcreteWidget, ScreenFlags};

pub const APP: &str = "com.example.app";

pub fn frame(index: u32) -> ConcreteWidget {
    ConcreteWidget {
        index,
        class_name: "android.widget.FrameLayout".into(),
        ..Default::default()
    }
}

pub fn button(index: u32, parent: u32, res: &str, text: &str) -> ConcreteWidget {
    ConcreteWidget {
        index,
        parent: Some(parent),
        class_name: "android.widget.Button".into(),
        resource_id: Some(res.into()),
        text: Some(text.into()),
        clickable: true,
        ..Default::default()
    }
}

pub fn label(index: u32, parent: u32, res: &str, text: &str) -> ConcreteWidget {
    ConcreteWidget {
        index,
        parent: Some(parent),
        class_name: "android.widget.TextView".into(),
        resource_id: Some(res.into()),
        text: Some(text.into()),
        ..Default::default()
    }
}

pub fn screen(window: &str, widgets: Vec<ConcreteWidget>) -> ConcreteObservation {
    ConcreteObservation {
        window: window.into(),
        package: APP.into(),
        widgets,
        ..Default::default()
    }
}

pub fn home() -> ConcreteObservation {
    ConcreteObservation {
        window: "com.android.launcher.Launcher".into(),
        package: "com.android.launcher".into(),
        flags: ScreenFlags {
            is_home_screen: true,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// List screen: a title label and an "open" button.
pub fn list(title: &str) -> ConcreteObservation {
    screen(
        "List",
        vec![frame(0), label(1, 0, "title", title), button(2, 0, "open", "Open")],
    )
}

/// List screen with an extra subtitle label under the title.
pub fn list_with_sub(title: &str, sub: &str) -> ConcreteObservation {
    let mut screen = list(title);
    screen.widgets.push(label(3, 0, "sub", sub));
    screen
}

/// Detail screen whose body resource id depends on the item.
pub fn detail(body: &str) -> ConcreteObservation {
    screen("Detail", vec![frame(0), label(1, 0, body, "Body text")])
}

pub fn main_screen() -> ConcreteObservation {
    screen("Main", vec![frame(0), button(1, 0, "go", "Go"), label(2, 0, "headline", "Welcome")])
}

pub fn settings() -> ConcreteObservation {
    screen("Settings", vec![frame(0), label(1, 0, "settings_title", "Settings")])
}

/// Options menu of Main with a single "settings" entry.
pub fn main_menu() -> ConcreteObservation {
    ConcreteObservation {
        window: "MainMenu".into(),
        window_kind: Some(WindowKind::OptionsMenu),
        owner_window: Some("Main".into()),
        package: APP.into(),
        widgets: vec![
            ConcreteWidget {
                index: 0,
                class_name: "android.widget.ListView".into(),
                ..Default::default()
            },
            ConcreteWidget {
                index: 1,
                parent: Some(0),
                class_name: "android.widget.TextView".into(),
                resource_id: Some("settings_item".into()),
                text: Some("Settings".into()),
                clickable: true,
                ..Default::default()
            },
        ],
        ..Default::default()
    }
}
