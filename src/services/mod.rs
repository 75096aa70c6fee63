pub(crate) mod annotation;
pub(crate) mod answer_key;
pub(crate) mod evaluation;
pub(crate) mod exam_editor;
pub(crate) mod exam_state;
pub(crate) mod exam_window;
pub(crate) mod publication;
pub(crate) mod storage;
