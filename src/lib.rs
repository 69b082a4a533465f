/*!
# Meal-Plan Submission Portal

A single-tenant web front-end that collects meal-plan spreadsheets from a
fixed roster of users and lets an administrator browse the submissions and a
read-only menu catalog.

## Overview

Users sign in, download a blank meal-plan template (A or B), start a timed
task, design the plan with the help of the menu catalog, and upload the
finished spreadsheet. Each upload is stored with its metadata (who, when,
how long it took) so the administrator can compare submissions.

## Architecture

### Catalog
- **Spreadsheet Loader** - reads the first sheet of an xlsx/xls/ods/csv file
  into menu rows, once at startup (or on an admin re-upload)
- **Filter Engine** - category buttons, name search and four mutually
  constraining selectors (classification code, major group, middle group,
  cooking method) whose option lists narrow each other
- **Korean collation** - option lists are ordered 가나다 style

### Submissions
- **Session** - per-browser state: user, selected meal type, task start
- **Recorder** - writes the file to every object sink (hosted storage, then
  local disk) and the metadata to every record sink (local CSV log, hosted
  table); one success of each kind is enough
- **History** - admin statistics, per-user files and CSV/XLSX export

### Web Layer
- axum router with cookie sessions, handlebars pages and a JSON catalog API

## Modules

- **collation**: Korean-aware string ordering
- **menu**: menu row type and header names
- **loader**: spreadsheet parsing and candidate probing
- **catalog**: filter engine and catalog view
- **submission**: civil timestamps, meal types, storage paths
- **history**: stored submissions, statistics
- **saving**: local upload files and the CSV log
- **session**: session state and registry
- **login**: credential verification and auth middleware
- **config**: environment configuration
- **storage**: object/record sinks and the recorder
- **remote**: hosted storage/table client
- **meal_template**: template download and caching
- **downloader**: history export (CSV, XLSX)
- **render**: HTML pages
- **app**: routing and server startup
*/

pub mod catalog;
pub mod collation;
pub mod config;
pub mod error;
pub mod history;
pub mod loader;
pub mod login;
pub mod menu;
pub mod saving;
pub mod session;
pub mod submission;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod downloader;
#[cfg(feature = "web")]
pub mod meal_template;
#[cfg(feature = "web")]
pub mod remote;
#[cfg(feature = "web")]
pub mod render;
#[cfg(feature = "web")]
pub mod storage;

pub use catalog::{
    Catalog, CategoryFilter, DependentField, Selection, compute_allowed_values,
    compute_visible_rows, reconcile, switch_category,
};
pub use error::{PortalError, Result};
pub use loader::{LoadOutcome, load_menu, parse_menu};
pub use menu::MenuRow;
pub use submission::{MealType, SubmissionRecord};
