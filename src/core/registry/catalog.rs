//! Static datatype catalog
//!
//! One [`DatatypeStrategy`] per exported datatype. Adding a datatype means
//! adding an entry to [`STRATEGIES`].

use crate::core::entity::{EntityDescriptor, FieldKind, FieldSpec, RecordHook};
use crate::core::query::{CursorMode, QuerySpec};
use crate::domain::ids::DatatypeName;
use crate::domain::record::MappedRecord;
use crate::domain::row::SourceRow;
use crate::domain::{QuarryError, Result};
use serde_json::Value;

/// Everything the pipeline needs to export one datatype
#[derive(Clone, Copy)]
pub struct DatatypeStrategy {
    /// Datatype name
    pub name: &'static str,
    /// Always exported when true, opt-in otherwise
    pub required: bool,
    /// Builds the entity descriptor
    pub descriptor: fn() -> Result<EntityDescriptor>,
    /// Builds the query definition
    pub query: fn() -> QuerySpec,
    /// Per-record pre-export hook
    pub hook: Option<RecordHook>,
}

impl std::fmt::Debug for DatatypeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatatypeStrategy")
            .field("name", &self.name)
            .field("required", &self.required)
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

/// Every known datatype, required ones first within each group of related data
pub const STRATEGIES: &[DatatypeStrategy] = &[
    DatatypeStrategy {
        name: "users",
        required: true,
        descriptor: users_descriptor,
        query: users_query,
        hook: None,
    },
    DatatypeStrategy {
        name: "courses",
        required: true,
        descriptor: courses_descriptor,
        query: courses_query,
        hook: None,
    },
    DatatypeStrategy {
        name: "categories",
        required: false,
        descriptor: categories_descriptor,
        query: categories_query,
        hook: None,
    },
    DatatypeStrategy {
        name: "enrolments",
        required: true,
        descriptor: enrolments_descriptor,
        query: enrolments_query,
        hook: None,
    },
    DatatypeStrategy {
        name: "grades",
        required: true,
        descriptor: grades_descriptor,
        query: grades_query,
        hook: None,
    },
    DatatypeStrategy {
        name: "forumposts",
        required: false,
        descriptor: forumposts_descriptor,
        query: forumposts_query,
        hook: Some(repair_message_text),
    },
    DatatypeStrategy {
        name: "quizattempts",
        required: false,
        descriptor: quizattempts_descriptor,
        query: quizattempts_query,
        hook: None,
    },
    DatatypeStrategy {
        name: "assignsubmissions",
        required: false,
        descriptor: assignsubmissions_descriptor,
        query: assignsubmissions_query,
        hook: None,
    },
    DatatypeStrategy {
        name: "logstore",
        required: false,
        descriptor: logstore_descriptor,
        query: logstore_query,
        hook: None,
    },
    DatatypeStrategy {
        name: "participation",
        required: false,
        descriptor: participation_descriptor,
        query: participation_query,
        hook: None,
    },
];

fn descriptor(name: &str, fields: Vec<FieldSpec>) -> Result<EntityDescriptor> {
    let name = DatatypeName::new(name).map_err(QuarryError::Schema)?;
    EntityDescriptor::new(name, fields)
}

fn id() -> FieldSpec {
    FieldSpec::required("id", FieldKind::Int)
}

fn timestamp(name: &str) -> FieldSpec {
    FieldSpec::optional(name, FieldKind::Int, 0)
}

// users

fn full_name(row: &SourceRow) -> Option<Value> {
    let first = row.get_str("firstname").unwrap_or_default().trim();
    let last = row.get_str("lastname").unwrap_or_default().trim();
    let name = format!("{first} {last}");
    let name = name.trim();
    (!name.is_empty()).then(|| Value::String(name.to_string()))
}

fn users_descriptor() -> Result<EntityDescriptor> {
    descriptor(
        "users",
        vec![
            id(),
            FieldSpec::required("username", FieldKind::Text),
            FieldSpec::optional("fullname", FieldKind::Text, "").with_accessor(full_name),
            FieldSpec::optional("email", FieldKind::Text, ""),
            FieldSpec::optional("idnumber", FieldKind::Text, ""),
            FieldSpec::optional("auth", FieldKind::Text, "manual"),
            FieldSpec::optional("suspended", FieldKind::Bool, false),
            FieldSpec::optional("lang", FieldKind::Text, "en"),
            FieldSpec::optional("timezone", FieldKind::Text, "99"),
            timestamp("firstaccess"),
            timestamp("lastaccess"),
            timestamp("timecreated"),
            timestamp("timemodified"),
        ],
    )
}

fn users_query() -> QuerySpec {
    QuerySpec::new("user", CursorMode::id())
        .select(&[
            "t.id",
            "t.username",
            "t.firstname",
            "t.lastname",
            "t.email",
            "t.idnumber",
            "t.auth",
            "t.suspended",
            "t.lang",
            "t.timezone",
            "t.firstaccess",
            "t.lastaccess",
            "t.timecreated",
            "t.timemodified",
        ])
        .filter("t.deleted = 0")
}

// courses and categories

fn courses_descriptor() -> Result<EntityDescriptor> {
    descriptor(
        "courses",
        vec![
            id(),
            FieldSpec::required("category", FieldKind::Int),
            FieldSpec::required("fullname", FieldKind::Text),
            FieldSpec::required("shortname", FieldKind::Text),
            FieldSpec::optional("idnumber", FieldKind::Text, ""),
            FieldSpec::nullable("summary", FieldKind::Raw),
            FieldSpec::optional("format", FieldKind::Text, "topics"),
            timestamp("startdate"),
            timestamp("enddate"),
            FieldSpec::optional("visible", FieldKind::Bool, true),
            timestamp("timecreated"),
            timestamp("timemodified"),
        ],
    )
}

fn courses_query() -> QuerySpec {
    QuerySpec::new("course", CursorMode::id())
        .select(&[
            "t.id",
            "t.category",
            "t.fullname",
            "t.shortname",
            "t.idnumber",
            "t.summary",
            "t.format",
            "t.startdate",
            "t.enddate",
            "t.visible",
            "t.timecreated",
            "t.timemodified",
        ])
        .filter("t.category > 0")
}

fn categories_descriptor() -> Result<EntityDescriptor> {
    descriptor(
        "categories",
        vec![
            id(),
            FieldSpec::required("name", FieldKind::Text),
            FieldSpec::optional("idnumber", FieldKind::Text, ""),
            FieldSpec::nullable("description", FieldKind::Raw),
            FieldSpec::optional("parent", FieldKind::Int, 0),
            FieldSpec::optional("sortorder", FieldKind::Int, 0),
            FieldSpec::optional("coursecount", FieldKind::Int, 0),
            FieldSpec::optional("visible", FieldKind::Bool, true),
            FieldSpec::optional("depth", FieldKind::Int, 1),
            FieldSpec::optional("path", FieldKind::Text, ""),
            timestamp("timemodified"),
        ],
    )
}

fn categories_query() -> QuerySpec {
    QuerySpec::new("course_categories", CursorMode::id()).select(&[
        "t.id",
        "t.name",
        "t.idnumber",
        "t.description",
        "t.parent",
        "t.sortorder",
        "t.coursecount",
        "t.visible",
        "t.depth",
        "t.path",
        "t.timemodified",
    ])
}

// enrolments

fn enrolments_descriptor() -> Result<EntityDescriptor> {
    descriptor(
        "enrolments",
        vec![
            id(),
            FieldSpec::required("userid", FieldKind::Int),
            FieldSpec::required("courseid", FieldKind::Int),
            FieldSpec::optional("method", FieldKind::Text, "manual"),
            FieldSpec::optional("roleid", FieldKind::Int, 0),
            FieldSpec::optional("status", FieldKind::Int, 0),
            timestamp("timestart"),
            timestamp("timeend"),
            timestamp("timecreated"),
            timestamp("timemodified"),
        ],
    )
}

fn enrolments_query() -> QuerySpec {
    QuerySpec::new("user_enrolments", CursorMode::id())
        .select(&[
            "t.id",
            "t.userid",
            "e.courseid",
            "e.enrol AS method",
            "e.roleid",
            "t.status",
            "t.timestart",
            "t.timeend",
            "t.timecreated",
            "t.timemodified",
        ])
        .join("JOIN {enrol} e ON e.id = t.enrolid")
}

// grades

fn grade_percentage(row: &SourceRow) -> Option<Value> {
    let grade = row.get_f64("finalgrade")?;
    let max = row.get_f64("grademax")?;
    let min = row.get_f64("grademin").unwrap_or(0.0);
    if max <= min {
        return None;
    }
    let percentage = (grade - min) / (max - min) * 100.0;
    serde_json::Number::from_f64((percentage * 100.0).round() / 100.0).map(Value::Number)
}

fn grades_descriptor() -> Result<EntityDescriptor> {
    descriptor(
        "grades",
        vec![
            id(),
            FieldSpec::required("userid", FieldKind::Int),
            FieldSpec::required("courseid", FieldKind::Int),
            FieldSpec::required("itemid", FieldKind::Int),
            FieldSpec::optional("itemname", FieldKind::Text, ""),
            FieldSpec::required("itemtype", FieldKind::Text),
            FieldSpec::optional("itemmodule", FieldKind::Text, ""),
            FieldSpec::nullable("finalgrade", FieldKind::Float),
            FieldSpec::optional("grademax", FieldKind::Float, 100.0),
            FieldSpec::optional("grademin", FieldKind::Float, 0.0),
            FieldSpec::nullable("percentage", FieldKind::Float).with_accessor(grade_percentage),
            FieldSpec::nullable("feedback", FieldKind::Raw),
            FieldSpec::optional("hidden", FieldKind::Bool, false),
            timestamp("timecreated"),
            timestamp("timemodified"),
        ],
    )
}

fn grades_query() -> QuerySpec {
    QuerySpec::new("grade_grades", CursorMode::id())
        .select(&[
            "t.id",
            "t.userid",
            "gi.courseid",
            "t.itemid",
            "gi.itemname",
            "gi.itemtype",
            "gi.itemmodule",
            "t.finalgrade::float8 AS finalgrade",
            "gi.grademax::float8 AS grademax",
            "gi.grademin::float8 AS grademin",
            "t.feedback",
            "t.hidden",
            "t.timecreated",
            "t.timemodified",
        ])
        .join("JOIN {grade_items} gi ON gi.id = t.itemid")
}

// forum posts

/// Normalizes line endings and drops undecodable characters in post bodies
fn repair_message_text(record: &mut MappedRecord) -> std::result::Result<(), String> {
    for field in ["subject", "message"] {
        let repaired = match record.get(field) {
            Some(Value::String(text)) if text.contains(['\r', '\u{FFFD}']) => {
                text.replace("\r\n", "\n").replace(['\r', '\u{FFFD}'], "")
            }
            _ => continue,
        };
        record.set(field, Value::String(repaired));
    }
    Ok(())
}

fn forumposts_descriptor() -> Result<EntityDescriptor> {
    descriptor(
        "forumposts",
        vec![
            id(),
            FieldSpec::required("discussion", FieldKind::Int),
            FieldSpec::required("forum", FieldKind::Int),
            FieldSpec::required("courseid", FieldKind::Int),
            FieldSpec::optional("parent", FieldKind::Int, 0),
            FieldSpec::required("userid", FieldKind::Int),
            FieldSpec::optional("subject", FieldKind::Text, ""),
            FieldSpec::optional("message", FieldKind::Raw, ""),
            FieldSpec::optional("messageformat", FieldKind::Int, 1),
            timestamp("created"),
            timestamp("modified"),
        ],
    )
}

fn forumposts_query() -> QuerySpec {
    QuerySpec::new("forum_posts", CursorMode::id())
        .select(&[
            "t.id",
            "t.discussion",
            "d.forum",
            "d.course AS courseid",
            "t.parent",
            "t.userid",
            "t.subject",
            "t.message",
            "t.messageformat",
            "t.created",
            "t.modified",
        ])
        .join("JOIN {forum_discussions} d ON d.id = t.discussion")
}

// quiz attempts

fn attempt_state(value: &Value) -> std::result::Result<(), String> {
    match value.as_str() {
        Some("inprogress" | "overdue" | "finished" | "abandoned") => Ok(()),
        other => Err(format!(
            "state must be inprogress, overdue, finished or abandoned, got {other:?}"
        )),
    }
}

fn quizattempts_descriptor() -> Result<EntityDescriptor> {
    descriptor(
        "quizattempts",
        vec![
            id(),
            FieldSpec::required("quiz", FieldKind::Int),
            FieldSpec::required("courseid", FieldKind::Int),
            FieldSpec::required("userid", FieldKind::Int),
            FieldSpec::optional("attempt", FieldKind::Int, 1),
            FieldSpec::required("state", FieldKind::Text).with_rule(attempt_state),
            FieldSpec::nullable("sumgrades", FieldKind::Float),
            timestamp("timestart"),
            timestamp("timefinish"),
            timestamp("timemodified"),
        ],
    )
}

fn quizattempts_query() -> QuerySpec {
    QuerySpec::new("quiz_attempts", CursorMode::id())
        .select(&[
            "t.id",
            "t.quiz",
            "q.course AS courseid",
            "t.userid",
            "t.attempt",
            "t.state",
            "t.sumgrades::float8 AS sumgrades",
            "t.timestart",
            "t.timefinish",
            "t.timemodified",
        ])
        .join("JOIN {quiz} q ON q.id = t.quiz")
        .filter("t.preview = 0")
}

// assignment submissions

fn assignsubmissions_descriptor() -> Result<EntityDescriptor> {
    descriptor(
        "assignsubmissions",
        vec![
            id(),
            FieldSpec::required("assignment", FieldKind::Int),
            FieldSpec::required("courseid", FieldKind::Int),
            FieldSpec::required("userid", FieldKind::Int),
            FieldSpec::optional("attemptnumber", FieldKind::Int, 0),
            FieldSpec::required("status", FieldKind::Text),
            FieldSpec::nullable("grade", FieldKind::Float),
            FieldSpec::nullable("grader", FieldKind::Int),
            FieldSpec::nullable("feedback", FieldKind::Raw),
            timestamp("timecreated"),
            timestamp("timemodified"),
        ],
    )
}

fn assignsubmissions_query() -> QuerySpec {
    QuerySpec::new("assign_submission", CursorMode::id())
        .select(&[
            "t.id",
            "t.assignment",
            "a.course AS courseid",
            "t.userid",
            "t.attemptnumber",
            "t.status",
            "g.grade::float8 AS grade",
            "g.grader",
            "fc.commenttext AS feedback",
            "t.timecreated",
            "t.timemodified",
        ])
        .join("JOIN {assign} a ON a.id = t.assignment")
        .join(
            "LEFT JOIN {assign_grades} g ON g.id = (SELECT MAX(g2.id) FROM {assign_grades} g2 \
             WHERE g2.assignment = t.assignment AND g2.userid = t.userid)",
        )
        .join("LEFT JOIN {assignfeedback_comments} fc ON fc.grade = g.id")
        .filter("t.latest = 1")
}

// event log

fn crud_flag(value: &Value) -> std::result::Result<(), String> {
    match value.as_str() {
        Some("c" | "r" | "u" | "d") => Ok(()),
        other => Err(format!("crud must be one of c, r, u, d, got {other:?}")),
    }
}

fn logstore_descriptor() -> Result<EntityDescriptor> {
    descriptor(
        "logstore",
        vec![
            id(),
            FieldSpec::required("eventname", FieldKind::Text),
            FieldSpec::required("component", FieldKind::Text),
            FieldSpec::required("action", FieldKind::Text),
            FieldSpec::required("target", FieldKind::Text),
            FieldSpec::required("crud", FieldKind::Text).with_rule(crud_flag),
            FieldSpec::optional("edulevel", FieldKind::Int, 0),
            FieldSpec::required("contextid", FieldKind::Int),
            FieldSpec::required("contextlevel", FieldKind::Int),
            FieldSpec::optional("userid", FieldKind::Int, 0),
            FieldSpec::optional("courseid", FieldKind::Int, 0),
            FieldSpec::nullable("relateduserid", FieldKind::Int),
            FieldSpec::optional("anonymous", FieldKind::Bool, false),
            FieldSpec::optional("origin", FieldKind::Text, ""),
            FieldSpec::optional("ip", FieldKind::Text, ""),
            FieldSpec::required("timecreated", FieldKind::Int),
        ],
    )
}

fn logstore_query() -> QuerySpec {
    QuerySpec::new("logstore_standard_log", CursorMode::timestamp("timecreated")).select(&[
        "t.id",
        "t.eventname",
        "t.component",
        "t.action",
        "t.target",
        "t.crud",
        "t.edulevel",
        "t.contextid",
        "t.contextlevel",
        "t.userid",
        "t.courseid",
        "t.relateduserid",
        "t.anonymous",
        "t.origin",
        "t.ip",
        "t.timecreated",
    ])
}

// participation aggregate

fn participation_descriptor() -> Result<EntityDescriptor> {
    descriptor(
        "participation",
        vec![
            FieldSpec::required("userid", FieldKind::Int),
            FieldSpec::required("contextid", FieldKind::Int),
            FieldSpec::optional("courseid", FieldKind::Int, 0),
            FieldSpec::required("views", FieldKind::Int),
            FieldSpec::required("lastaccess", FieldKind::Int),
        ],
    )
}

fn participation_query() -> QuerySpec {
    QuerySpec::new(
        "logstore_standard_log",
        CursorMode::grouped(&["userid", "contextid"]),
    )
    .select(&[
        "t.userid",
        "t.contextid",
        "MAX(t.courseid) AS courseid",
        "COUNT(*) AS views",
        "MAX(t.timecreated) AS lastaccess",
    ])
    .filter("t.userid > 0")
    .filter("t.crud = 'r'")
}
