mod common;

use axum::http::{StatusCode, header};
use qrshelf::naming::is_opaque_id;
use serde_json::json;

use common::{BASE_URL, Part, TestApp, id_of, str_of};

#[tokio::test]
async fn upload_rename_and_delete_scenario() {
    let app = TestApp::new().await;

    let project = app.create_project("Server").await;
    let project_id = id_of(&project);
    let section = app.add_sections(project_id, &["Rack1"]).await.remove(0);
    let section_id = id_of(&section);

    let file = app
        .upload(section_id, "diagram.png", b"png-bytes", &["infra", "v1"])
        .await;
    let file_id = id_of(&file);
    assert_eq!(str_of(&file, "name"), "diagram");
    assert_eq!(file["tags"], json!(["infra", "v1"]));
    let url = str_of(&file, "url_qr_code").to_string();
    assert_eq!(url, format!("{}/api/uploadFile/download-file/{}", BASE_URL, file_id));
    let path_file = str_of(&file, "path_file").to_string();
    assert!(path_file.starts_with("uploads/"));
    assert!(path_file.ends_with("/diagram.png"));
    assert!(app.abs(str_of(&file, "path_pdf")).is_file());

    let (status, tags) = app
        .get_json(&format!("/api/uploadFile/files/{}/tags", file_id))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tags, json!(["infra", "v1"]));

    let (status, bytes, headers) = app
        .get(&format!("/api/uploadFile/download-file/{}", file_id))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&bytes[..], b"png-bytes");
    assert_eq!(headers[header::CONTENT_TYPE], "image/png");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"diagram.png\""
    );

    let (status, renamed) = app
        .send_json(
            "PUT",
            &format!("/api/sections/{}", section_id),
            json!({ "section_name": "Rack1-new" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", renamed);
    assert_eq!(str_of(&renamed, "section_name"), "Rack1-new");

    let (_, after) = app
        .get_json(&format!("/api/uploadFile/files/{}", file_id))
        .await;
    assert_eq!(after["tags"], json!(["infra", "v1"]));
    assert_eq!(str_of(&after, "url_qr_code"), url);
    assert_eq!(str_of(&after, "path_file"), path_file);
    assert_eq!(std::fs::read(app.abs(&path_file)).unwrap(), b"png-bytes");
    assert!(app.abs(str_of(&after, "path_pdf")).is_file());

    let project_dir = app
        .state
        .paths
        .dir_for(&[str_of(&project, "folder_name")])
        .unwrap();
    assert!(project_dir.is_dir());

    let (status, _) = app.delete(&format!("/api/projects/{}", project_id)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.get_json(&format!("/api/sections/{}", section_id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
    let (status, _) = app
        .get_json(&format!("/api/uploadFile/files/{}", file_id))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(!project_dir.exists());
}

#[tokio::test]
async fn same_display_name_in_two_sections_does_not_collide() {
    let app = TestApp::new().await;
    let project_id = id_of(&app.create_project("Lab").await);
    let sections = app.add_sections(project_id, &["A", "B"]).await;

    let first = app.upload(id_of(&sections[0]), "notes.txt", b"first", &[]).await;
    let second = app.upload(id_of(&sections[1]), "notes.txt", b"second", &[]).await;
    assert_eq!(str_of(&first, "name"), str_of(&second, "name"));
    assert_ne!(str_of(&first, "folder_name"), str_of(&second, "folder_name"));
    assert!(is_opaque_id(str_of(&first, "folder_name")));
    assert!(is_opaque_id(str_of(&second, "folder_name")));
    assert_ne!(str_of(&first, "path_file"), str_of(&second, "path_file"));

    for (file, expected) in [(&first, &b"first"[..]), (&second, &b"second"[..])] {
        let (status, bytes, _) = app
            .get(&format!("/api/uploadFile/download-file/{}", id_of(file)))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&bytes[..], expected);
    }

    let (status, _) = app
        .delete(&format!("/api/uploadFile/files/{}", id_of(&first)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!app.abs(str_of(&first, "path_file")).exists());
    assert!(!app.abs(str_of(&first, "path_file")).parent().unwrap().exists());

    let (status, bytes, _) = app
        .get(&format!("/api/uploadFile/download-file/{}", id_of(&second)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&bytes[..], b"second");
}

#[tokio::test]
async fn renaming_to_the_current_name_changes_nothing() {
    let app = TestApp::new().await;
    let project_id = id_of(&app.create_project("Server").await);
    let section = app.add_sections(project_id, &["Rack1"]).await.remove(0);
    let file = app.upload(id_of(&section), "a.png", b"a", &[]).await;
    let label = app.abs(str_of(&file, "path_pdf"));
    let modified = std::fs::metadata(&label).unwrap().modified().unwrap();

    let (status, same) = app
        .send_json(
            "PUT",
            &format!("/api/sections/{}", id_of(&section)),
            json!({ "section_name": "Rack1" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(same, section);
    assert_eq!(std::fs::metadata(&label).unwrap().modified().unwrap(), modified);

    let (status, project) = app
        .send_multipart(
            "PUT",
            &format!("/api/projects/{}", project_id),
            &[Part::Text("projectName", "Server")],
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(str_of(&project, "project_name"), "Server");
    assert_eq!(std::fs::metadata(&label).unwrap().modified().unwrap(), modified);
}

#[tokio::test]
async fn project_rename_regenerates_labels_without_moving_payloads() {
    let app = TestApp::new().await;
    let project_id = id_of(&app.create_project("Server").await);
    let section = app.add_sections(project_id, &["Rack1"]).await.remove(0);
    let file = app.upload(id_of(&section), "a.png", b"payload", &["x"]).await;

    let (status, renamed) = app
        .send_multipart(
            "PUT",
            &format!("/api/projects/{}", project_id),
            &[Part::Text("projectName", "Server-2")],
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", renamed);
    assert_eq!(str_of(&renamed, "project_name"), "Server-2");

    let (_, after) = app
        .get_json(&format!("/api/uploadFile/files/{}", id_of(&file)))
        .await;
    assert_eq!(after["path_file"], file["path_file"]);
    assert_eq!(after["url_qr_code"], file["url_qr_code"]);
    assert_eq!(after["path_pdf"], file["path_pdf"]);
    assert!(app.abs(str_of(&after, "path_pdf")).is_file());
}

#[tokio::test]
async fn duplicate_names_are_conflicts() {
    let app = TestApp::new().await;
    let project_id = id_of(&app.create_project("Server").await);
    app.create_project("Other").await;

    let (status, body) = app
        .send_multipart("POST", "/api/projects", &[Part::Text("projectName", "Server")])
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());

    let (status, _) = app
        .send_multipart(
            "PUT",
            &format!("/api/projects/{}", project_id),
            &[Part::Text("projectName", "Other")],
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    app.add_sections(project_id, &["Rack1"]).await;
    let (status, body) = app
        .send_json(
            "POST",
            "/api/sections/addsections",
            json!({ "projectId": project_id, "sectionNames": ["Rack2", "Rack1", "Rack3", "Rack3"] }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["errors"]["Rack1"].is_string());
    assert!(body["errors"]["Rack3"].is_string());
    assert!(body["errors"].get("Rack2").is_none());

    let (_, sections) = app
        .get_json(&format!("/api/projects/{}/sections", project_id))
        .await;
    assert_eq!(sections.as_array().unwrap().len(), 1);

    let rack2 = app.add_sections(project_id, &["Rack2", "  "]).await;
    assert_eq!(rack2.len(), 1);
    let (status, _) = app
        .send_json(
            "PUT",
            &format!("/api/sections/{}", id_of(&rack2[0])),
            json!({ "section_name": "Rack1" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn missing_entities_are_not_found() {
    let app = TestApp::new().await;
    assert_eq!(app.get_json("/api/projects/999").await.0, StatusCode::NOT_FOUND);
    assert_eq!(app.get_json("/api/sections/999").await.0, StatusCode::NOT_FOUND);
    assert_eq!(
        app.get_json("/api/uploadFile/files/999").await.0,
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        app.get("/api/uploadFile/download-file/999").await.0,
        StatusCode::NOT_FOUND
    );
    assert_eq!(app.delete("/api/sections/999").await.0, StatusCode::NOT_FOUND);
    assert_eq!(
        app.send_json("PUT", "/api/sections/999", json!({ "section_name": "x" }))
            .await
            .0,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn blank_names_are_rejected() {
    let app = TestApp::new().await;
    let (status, _) = app
        .send_multipart("POST", "/api/projects", &[Part::Text("projectName", "   ")])
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let project_id = id_of(&app.create_project("Server").await);
    let section = app.add_sections(project_id, &["Rack1"]).await.remove(0);
    let (status, _) = app
        .send_json(
            "PUT",
            &format!("/api/sections/{}", id_of(&section)),
            json!({ "section_name": " " }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn section_delete_removes_its_folder_and_rows() {
    let app = TestApp::new().await;
    let project = app.create_project("Server").await;
    let section = app.add_sections(id_of(&project), &["Rack1"]).await.remove(0);
    let file = app.upload(id_of(&section), "a.png", b"a", &["t"]).await;

    let section_dir = app
        .state
        .paths
        .dir_for(&[str_of(&project, "folder_name"), str_of(&section, "folder_name")])
        .unwrap();
    assert!(section_dir.is_dir());

    let (status, body) = app.delete(&format!("/api/sections/{}", id_of(&section))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].is_string());
    assert!(!section_dir.exists());
    assert_eq!(
        app.get_json(&format!("/api/uploadFile/files/{}", id_of(&file)))
            .await
            .0,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn project_image_is_stored_replaced_and_removed() {
    let app = TestApp::new().await;
    let (status, project) = app
        .send_multipart(
            "POST",
            "/api/projects",
            &[
                Part::Text("projectName", "Server"),
                Part::File("projectImage", "logo.png", common::PNG_BYTES),
            ],
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", project);
    let first = str_of(&project, "project_image").to_string();
    assert!(first.starts_with("uploads/project_img/projectImage-"));
    assert!(first.ends_with(".png"));
    assert!(app.abs(&first).is_file());

    let (status, updated) = app
        .send_multipart(
            "PUT",
            &format!("/api/projects/{}", id_of(&project)),
            &[Part::File("projectImage", "logo2.png", common::PNG_BYTES)],
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", updated);
    assert_eq!(str_of(&updated, "project_name"), "Server");
    let second = str_of(&updated, "project_image").to_string();
    assert_ne!(first, second);
    assert!(!app.abs(&first).exists());
    assert!(app.abs(&second).is_file());

    let (status, _) = app.delete(&format!("/api/projects/{}", id_of(&project))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!app.abs(&second).exists());
}

#[tokio::test]
async fn non_image_project_uploads_are_rejected() {
    let app = TestApp::new().await;
    let (status, _) = app
        .send_multipart(
            "POST",
            "/api/projects",
            &[
                Part::Text("projectName", "Server"),
                Part::File("projectImage", "logo.png", b"not an image"),
            ],
        )
        .await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let (status, _) = app
        .send_multipart(
            "POST",
            "/api/projects",
            &[
                Part::Text("projectName", "Server"),
                Part::File("projectImage", "logo.exe", common::PNG_BYTES),
            ],
        )
        .await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let (_, projects) = app.get_json("/api/projects").await;
    assert_eq!(projects, json!([]));
}
